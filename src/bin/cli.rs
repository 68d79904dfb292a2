use anyhow::{anyhow, Result};
use autotag::{
    core::config::{parse_scan_limit, AutotagConfig},
    filing::{FilingType, IdSource, RandomIds, SequentialIds},
    tagging::{HttpTagger, LexiconTagger, Tagger},
    Annotator,
};
use std::fs;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "autotag-cli", about = "Annotate an HTML filing with predicted XBRL tags")]
struct Opt {
    /// Filing to annotate
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// Where to write the annotated filing (default: auto_tagging_<name> next to the input)
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Form type, e.g. 10-Q or 10-K
    #[structopt(short = "t", long)]
    filing_type: Option<FilingType>,

    /// Page markers to scan for statement tables, or "all"
    #[structopt(long)]
    scan_limit: Option<String>,

    /// Directory for intermediate table artifacts
    #[structopt(long, parse(from_os_str))]
    work_dir: Option<PathBuf>,

    /// Model server base URL
    #[structopt(long)]
    model_url: Option<String>,

    /// JSON lexicon used instead of a model server
    #[structopt(long, parse(from_os_str))]
    lexicon: Option<PathBuf>,

    /// Fixed run id for reproducible wrapper ids
    #[structopt(long)]
    run_id: Option<String>,
}

fn default_output(input: &Path) -> Result<PathBuf> {
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Input has no file name: {:?}", input))?;
    Ok(input.with_file_name(format!("auto_tagging_{}", name)))
}

fn build_config(opt: &Opt) -> Result<AutotagConfig> {
    let mut config = AutotagConfig::from_env()?;
    if let Some(filing_type) = &opt.filing_type {
        let scan_limit = filing_type.scan_limit();
        config.filing_type = filing_type.clone();
        config.scan_limit = scan_limit;
    }
    if let Some(limit) = &opt.scan_limit {
        config.scan_limit = parse_scan_limit(limit)?;
    }
    if let Some(dir) = &opt.work_dir {
        config.work_dir = dir.clone();
    }
    if let Some(url) = &opt.model_url {
        config.model_url = Some(url.clone());
    }
    Ok(config)
}

fn build_tagger(opt: &Opt, config: &AutotagConfig) -> Result<Box<dyn Tagger>> {
    if let Some(path) = &opt.lexicon {
        log::info!("Using lexicon tagger from {}", path.display());
        return Ok(Box::new(LexiconTagger::from_file(path)?));
    }
    match &config.model_url {
        Some(url) => {
            log::info!("Using model server at {}", url);
            Ok(Box::new(HttpTagger::new(url)?))
        }
        None => Err(anyhow!(
            "No tagger configured: pass --lexicon or --model-url (or set AUTOTAG_MODEL_URL)"
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();
    log::debug!("Logger initialized");

    let opt = Opt::from_args();

    if !opt.input.exists() {
        eprintln!("Input file does not exist: {:?}", opt.input);
        std::process::exit(1);
    }

    let config = build_config(&opt)?;
    log::info!(
        "Annotating {} as {} (known types: {})",
        opt.input.display(),
        config.filing_type,
        FilingType::list_types()
    );
    let tagger = build_tagger(&opt, &config)?;

    let raw = String::from_utf8_lossy(&fs::read(&opt.input)?).into_owned();
    let doc_name = opt
        .input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("filing.htm")
        .to_string();

    let mut ids: Box<dyn IdSource> = match &opt.run_id {
        Some(run) => Box::new(SequentialIds::new(run.clone())),
        None => Box::new(RandomIds),
    };

    let annotator = Annotator::new(&config, tagger.as_ref());
    let annotated = annotator.annotate(&raw, &doc_name, ids.as_mut()).await?;

    let output = match &opt.output {
        Some(path) => path.clone(),
        None => default_output(&opt.input)?,
    };
    fs::write(&output, &annotated.html)?;
    log::info!("Wrote {}", output.display());

    println!("{}", serde_json::to_string_pretty(&annotated.summary)?);
    Ok(())
}
