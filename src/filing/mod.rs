pub mod artifacts;
pub mod context;
pub mod dom;
pub mod inject;
pub mod pages;
pub mod report;
pub mod tables;
pub mod text;

#[cfg(test)]
mod tests;

pub use self::inject::{IdSource, RandomIds, SequentialIds, TagInjector};
pub use self::report::FilingType;
pub use self::tables::StatementKind;
