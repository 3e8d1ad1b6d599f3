//! Show which resource attribute tuples a request would be reviewed with.
//!
//! Output format:
//!   endpoint PATH  mapping N
//!   verb=... resource=... namespace=...
//!
//! Usage:
//!   cargo run --bin authz-explain -- [OPTIONS] <config> <METHOD> <path?query>
//!
//! Options:
//!   -H, --header Name:Value   Add a request header (repeatable)
//!   --json                    Print tuples as JSON
//!   --check                   Also report templates that cannot render
//!   --help                    Show help

use axum_endpoint_authz::{resource_attributes, AuthorizationConfig, RequestView, TemplateEngine};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    method: Option<String>,
    target: Option<String>,
    headers: Vec<(String, String)>,
    json: bool,
    check: bool,
}

fn print_help() {
    println!("Endpoint authorization explainer");
    println!();
    println!("Usage: authz-explain [OPTIONS] <config> <METHOD> <path?query>");
    println!();
    println!("Prints the resource attribute tuples the request maps to, in review order.");
    println!("The config format is picked from the extension (.yaml, .yml, .toml).");
    println!();
    println!("Options:");
    println!("  -H, --header Name:Value   Add a request header (repeatable)");
    println!("  --json                    Print tuples as JSON");
    println!("  --check                   Report templates that cannot render");
    println!("  --help                    Show this help message");
}

fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let mut options = Options::default();
    let mut positional = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(None),
            "--json" => options.json = true,
            "--check" => options.check = true,
            "-H" | "--header" => {
                let value = iter
                    .next()
                    .ok_or_else(|| format!("{} requires a Name:Value argument", arg))?;
                let (name, value) = value
                    .split_once(':')
                    .ok_or_else(|| format!("Invalid header '{}', expected Name:Value", value))?;
                options.headers.push((name.trim().to_string(), value.trim().to_string()));
            }
            _ if !arg.starts_with('-') => positional.push(arg.clone()),
            _ => return Err(format!("Unknown option: {}", arg)),
        }
    }

    let mut positional = positional.into_iter();
    options.config = positional.next().map(PathBuf::from);
    options.method = positional.next().map(|m| m.to_ascii_uppercase());
    options.target = positional.next();
    if let Some(extra) = positional.next() {
        return Err(format!("Unexpected argument: {}", extra));
    }
    Ok(Some(options))
}

fn report_templates(config: &AuthorizationConfig) -> usize {
    let engine = TemplateEngine::new();
    let mut problems = 0;
    for endpoint in &config.endpoints {
        for (index, mapping) in endpoint.mappings.iter().enumerate() {
            for rule in &mapping.resources {
                for (field, template) in rule.resource_attributes.fields() {
                    if let Err(err) = engine.check(template) {
                        problems += 1;
                        println!(
                            "warning: {} mapping {} field {}: {}",
                            endpoint.path, index, field, err
                        );
                    }
                }
            }
        }
    }
    problems
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() {
        print_help();
        return ExitCode::SUCCESS;
    }

    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_help();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::from(2);
        }
    };

    let (Some(config_path), Some(method), Some(target)) = (options.config, options.method, options.target) else {
        eprintln!("Expected <config> <METHOD> <path?query>, see --help");
        return ExitCode::from(2);
    };

    let config = match AuthorizationConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error loading {}: {}", config_path.display(), err);
            return ExitCode::FAILURE;
        }
    };

    if options.check {
        let problems = report_templates(&config);
        if problems == 0 {
            println!("All templates render.");
        }
        println!();
    }

    let mut request = RequestView::new(method.as_str(), &target);
    for (name, value) in &options.headers {
        request = request.header(name, value);
    }

    let (_, rule_match) = config.match_rules_with_match(request.path(), request.method());
    let tuples = resource_attributes(&config, &request);

    if options.json {
        match serde_json::to_string_pretty(&tuples) {
            Ok(json) => println!("{}", json),
            Err(err) => {
                eprintln!("Error encoding tuples: {}", err);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    println!("{} {}", request.method(), request.path());
    match rule_match {
        None => println!("  no endpoint matched"),
        Some(found) => {
            let endpoint = &config.endpoints[found.endpoint_index];
            match found.mapping_index {
                Some(index) => println!("  endpoint {}  mapping {}", endpoint.path, index),
                None => println!("  endpoint {}  no mapping for method", endpoint.path),
            }
        }
    }

    if tuples.is_empty() {
        println!("  no rule matched (allowed by default)");
    } else {
        for tuple in &tuples {
            println!("  {}", tuple);
        }
    }

    ExitCode::SUCCESS
}
