use std::env;
use std::fs;
use std::path::PathBuf;

use edf2wineeg::{ConvertError, Converter, ConverterConfig};

const USAGE: &str = "usage: edf2wineeg INPUT.edf OUTPUT.eeg [PATIENT_NAME] [--templates DIR] [--config FILE] [--report FILE] [--patient-from-edf]";

#[derive(Debug, Default)]
struct Args {
    input: PathBuf,
    output: PathBuf,
    patient: Option<String>,
    templates: Option<PathBuf>,
    config: Option<PathBuf>,
    report: Option<PathBuf>,
    patient_from_edf: bool,
}

enum Invocation {
    Convert(Args),
    Help,
    Version,
}

fn parse_args(raw: Vec<String>) -> Result<Invocation, String> {
    let mut args = Args::default();
    let mut positional = Vec::new();
    let mut iter = raw.into_iter();

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| iter.next().ok_or_else(|| format!("{} needs a value\n{}", flag, USAGE));
        match arg.as_str() {
            "-h" | "--help" => return Ok(Invocation::Help),
            "-V" | "--version" => return Ok(Invocation::Version),
            "--templates" => args.templates = Some(PathBuf::from(value("--templates")?)),
            "--config" => args.config = Some(PathBuf::from(value("--config")?)),
            "--report" => args.report = Some(PathBuf::from(value("--report")?)),
            "--patient-from-edf" => args.patient_from_edf = true,
            flag if flag.starts_with("--") => return Err(format!("unknown option {}\n{}", flag, USAGE)),
            _ => positional.push(arg.clone()),
        }
    }

    let mut positional = positional.into_iter();
    match (positional.next(), positional.next()) {
        (Some(input), Some(output)) => {
            args.input = PathBuf::from(input);
            args.output = PathBuf::from(output);
        }
        _ => return Err(USAGE.to_string()),
    }
    args.patient = positional.next();
    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument '{}'\n{}", extra, USAGE));
    }
    Ok(Invocation::Convert(args))
}

/// Returns whether the validation summary passed.
fn run(args: Args) -> Result<bool, ConvertError> {
    let mut config = match &args.config {
        Some(path) => ConverterConfig::from_json_file(path)?,
        None => ConverterConfig::default(),
    };
    config.patient_from_edf |= args.patient_from_edf;
    let templates = args.templates.clone().unwrap_or_else(|| PathBuf::from("."));
    log::debug!("Template directory: {}", templates.display());

    let converter = Converter::from_template_dir(&templates, config)?;
    let (output, report) = converter.convert(&args.input, &args.output, args.patient.as_deref())?;

    for finding in &report.findings {
        println!("{}", finding);
    }
    if let Some(path) = &args.report {
        fs::write(path, report.to_json()?)?;
        log::info!("Saved report to {}", path.display());
    }

    let passed = report.passed();
    println!("{} -> {} ({})", args.input.display(), output.display(), if passed { "PASS" } else { "FAIL" });
    Ok(passed)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args(env::args().skip(1).collect()) {
        Ok(Invocation::Convert(args)) => args,
        Ok(Invocation::Help) => {
            println!("{}", USAGE);
            return;
        }
        Ok(Invocation::Version) => {
            println!("edf2wineeg {}", edf2wineeg::version());
            return;
        }
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
    };

    match run(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            log::error!("{}", err);
            eprintln!("conversion failed: {}", err);
            std::process::exit(1);
        }
    }
}
