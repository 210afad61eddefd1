use anyhow::{Context, Result};
use bazel_source_finder::builder::build_registry;
use bazel_source_finder::classpath::{BuildVersion, ClassPathEntry};
use bazel_source_finder::cli::{Cli, Commands};
use bazel_source_finder::config::{resolve_temp_dir, resolve_workspace};
use bazel_source_finder::declaration::{
    TextRange, find_declaration_comment, find_declaration_range,
};
use bazel_source_finder::discover::BazelDiscoverer;
use bazel_source_finder::locator::find_source_file_info;
use bazel_source_finder::logging::init_tracing;
use bazel_source_finder::navigate::{DeclarationTarget, SourceLocation, SourceNavigator};
use bazel_source_finder::resolver::{ClassPathResolver, default_resolver};
use bazel_source_finder::tempfiles::{SystemClock, TempFileCache};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

fn main() -> Result<()> {
    let cli = parse_cli();
    init_tracing(cli.log_level.as_deref());

    match cli.command.clone() {
        Commands::Extract { output, jars } => {
            extract(&output, &jars)?;
        }
        Commands::Classpath => {
            let workspace = resolve_workspace(&cli)?;
            let resolver = default_resolver(&[workspace]);
            let result = ClasspathResult {
                resolver_type: resolver.resolver_type(),
                build_version: resolver.current_build_version(),
                entries: resolver.classpath(),
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Locate {
            source_jar,
            class_name,
            symbol,
        } => {
            let result = locate(&source_jar, &class_name, symbol.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Definition { class_name, symbol } => {
            let workspace = resolve_workspace(&cli)?;
            let temp_dir = resolve_temp_dir(&cli);
            let result = definition(&workspace, &temp_dir, &class_name, symbol.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Version => {
            let workspace = resolve_workspace(&cli)?;
            let build_version = BazelDiscoverer::new(workspace).build_version();
            println!(
                "{}",
                serde_json::to_string_pretty(&VersionResult { build_version })?
            );
        }
    }

    Ok(())
}

fn parse_cli() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    Cli::parse_from(rewrite_args_for_implicit_extract(args))
}

/// `bazel-source-finder out.json a.jar` is how build rules call the tool,
/// so a missing subcommand means `extract`.
fn rewrite_args_for_implicit_extract(mut args: Vec<String>) -> Vec<String> {
    if args.len() <= 1 {
        return args;
    }

    let subcommands = [
        "extract",
        "classpath",
        "locate",
        "definition",
        "version",
        "help",
    ];

    let mut idx = 1usize;
    while idx < args.len() {
        let a = args[idx].as_str();
        if a == "--" {
            idx += 1;
            break;
        }

        if a == "--workspace" || a == "--temp-dir" || a == "--log-level" {
            idx += 2;
            continue;
        }

        if a.starts_with('-') {
            idx += 1;
            continue;
        }

        break;
    }

    if idx < args.len() {
        let token = args[idx].as_str();
        if !subcommands.contains(&token) {
            args.insert(idx, "extract".to_string());
        }
    }

    args
}

fn extract(output: &Path, jars: &[PathBuf]) -> Result<()> {
    let start = Instant::now();
    let registry = build_registry(jars);
    registry
        .write_to(output)
        .with_context(|| format!("Failed to write metadata: {}", output.display()))?;
    tracing::info!(
        output = %output.display(),
        jars = jars.len(),
        classes = registry.len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "wrote class metadata"
    );
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClasspathResult {
    resolver_type: String,
    build_version: BuildVersion,
    entries: BTreeSet<ClassPathEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionResult {
    build_version: BuildVersion,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocateResult {
    source_jar: String,
    path_in_jar: String,
    is_java: bool,
    symbol: String,
    range: Option<TextRange>,
    documentation: Option<String>,
}

fn locate(source_jar: &Path, class_name: &str, symbol: Option<&str>) -> Result<LocateResult> {
    let target = DeclarationTarget::from_fq_name(class_name, symbol);
    let info = find_source_file_info(source_jar, &target.package_name, &target.class_name)
        .with_context(|| format!("Failed to read source jar: {}", source_jar.display()))?
        .with_context(|| {
            format!(
                "No source for {} in {}",
                target.class_fq_name,
                source_jar.display()
            )
        })?;

    Ok(LocateResult {
        source_jar: source_jar.to_string_lossy().to_string(),
        range: find_declaration_range(&info.contents, &target.symbol_name),
        documentation: find_declaration_comment(&info.contents, &target.symbol_name),
        path_in_jar: info.path_in_jar,
        is_java: info.is_java,
        symbol: target.symbol_name,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionResult {
    class_name: String,
    symbol: String,
    location: Option<SourceLocation>,
    documentation: Option<String>,
}

fn definition(
    workspace: &Path,
    temp_dir: &Path,
    class_name: &str,
    symbol: Option<&str>,
) -> Result<DefinitionResult> {
    let entries = default_resolver(&[workspace.to_path_buf()]).classpath();
    let temp_files = TempFileCache::new(temp_dir, Arc::new(SystemClock))
        .with_context(|| format!("Failed to create temp dir under {}", temp_dir.display()))?;
    let navigator = SourceNavigator::new(temp_files);

    let target = DeclarationTarget::from_fq_name(class_name, symbol);
    let result = DefinitionResult {
        class_name: target.class_fq_name.clone(),
        symbol: target.symbol_name.clone(),
        location: navigator.find_definition(&entries, &target),
        documentation: navigator.find_documentation(&entries, &target),
    };
    navigator
        .shutdown()
        .context("Failed to remove session temp files")?;
    Ok(result)
}
