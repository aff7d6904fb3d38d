//! SM-010: CLI subcommands (init, validate, synth, graph).

use crate::core::{assembly, parser, resolver, synth, tree, types};
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new app manifest
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate app.yaml without synthesizing
    Validate {
        /// Path to app.yaml
        #[arg(short, long, default_value = "app.yaml")]
        file: PathBuf,
    },

    /// Synthesize one template per stack
    Synth {
        /// Path to app.yaml
        #[arg(short, long, default_value = "app.yaml")]
        file: PathBuf,

        /// Output directory for templates and manifest.json
        #[arg(short, long, default_value = "cdk.out")]
        output: PathBuf,

        /// Only print this stack (by stack name)
        #[arg(short, long)]
        stack: Option<String>,

        /// Print templates to stdout instead of writing files
        #[arg(long)]
        stdout: bool,
    },

    /// Show stacks in deployment order with the edges behind each dependency
    Graph {
        /// Path to app.yaml
        #[arg(short, long, default_value = "app.yaml")]
        file: PathBuf,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Synth {
            file,
            output,
            stack,
            stdout,
        } => cmd_synth(&file, &output, stack.as_deref(), stdout),
        Commands::Graph { file } => cmd_graph(&file),
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let manifest_path = path.join("app.yaml");
    if manifest_path.exists() {
        return Err(format!("{} already exists", manifest_path.display()));
    }
    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;

    let template = r#"version: "1.0"
name: my-app
description: "Synthesized by stacksmith"

constructs:
  MyStack:
    kind: stack
    children:
      Bucket:
        kind: resource
        type: AWS::S3::Bucket
        removal_policy: retain
"#;
    std::fs::write(&manifest_path, template)
        .map_err(|e| format!("cannot write {}: {}", manifest_path.display(), e))?;

    println!("Initialized stacksmith app at {}", path.display());
    println!("  Created: {}", manifest_path.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let manifest = parse_and_validate(file)?;
    let tree = parser::build_tree(&manifest)?;
    let stacks = tree.stacks();
    let resources: usize = stacks.iter().map(|&s| tree.resources_of(s).len()).sum();
    println!(
        "OK: {} ({} stacks, {} resources)",
        manifest.name,
        stacks.len(),
        resources
    );
    Ok(())
}

/// Parse and validate an app manifest, returning errors if invalid.
fn parse_and_validate(file: &Path) -> Result<types::AppManifest, String> {
    let manifest = parser::parse_manifest_file(file)?;
    let errors = parser::validate_manifest(&manifest);
    if errors.is_empty() {
        return Ok(manifest);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err(format!("{} validation error(s)", errors.len()))
}

/// Parse, validate, build and synthesize.
fn load_assembly(file: &Path) -> Result<(tree::ConstructTree, synth::CloudAssembly), String> {
    let manifest = parse_and_validate(file)?;
    let tree = parser::build_tree(&manifest)?;
    let assembly = synth::synth(&tree).map_err(|e| e.to_string())?;
    tracing::info!(app = %manifest.name, stacks = assembly.stacks.len(), "synthesized");
    Ok((tree, assembly))
}

fn cmd_synth(file: &Path, output: &Path, stack: Option<&str>, stdout: bool) -> Result<(), String> {
    let (_, assembly) = load_assembly(file)?;

    let selected = match stack {
        Some(name) => vec![select_stack(&assembly, name)?],
        None => assembly.stacks.iter().collect(),
    };

    if stdout {
        for s in selected {
            let json = serde_json::to_string_pretty(&s.template)
                .map_err(|e| format!("serialize error: {}", e))?;
            println!("{}", json);
        }
        return Ok(());
    }

    let written = assembly::write_assembly(output, &assembly)?;
    println!(
        "Synthesized {} stack(s) to {} ({} files)",
        assembly.stacks.len(),
        output.display(),
        written.len()
    );
    Ok(())
}

/// Resolve `--stack NAME`. A name shared by several stacks is an error.
fn select_stack<'a>(assembly: &'a synth::CloudAssembly, name: &str) -> Result<&'a types::StackArtifact, String> {
    match assembly.stacks_named(name).as_slice() {
        [] => Err(format!("no stack named '{}'", name)),
        [one] => Ok(*one),
        many => {
            let paths: Vec<&str> = many.iter().map(|s| s.path.as_str()).collect();
            Err(format!(
                "stack name '{}' is ambiguous: used by {}",
                name,
                paths.join(", ")
            ))
        }
    }
}

fn cmd_graph(file: &Path) -> Result<(), String> {
    let (tree, assembly) = load_assembly(file)?;
    print!("{}", render_graph(&tree, &assembly));
    Ok(())
}

/// Text rendering of the deployment order and dependency reasons.
fn render_graph(tree: &tree::ConstructTree, assembly: &synth::CloudAssembly) -> String {
    let mut out = String::new();
    for (i, artifact_id) in assembly.deployment_order.iter().enumerate() {
        let Some(artifact) = assembly.stacks.iter().find(|s| &s.artifact_id == artifact_id) else {
            continue;
        };
        out.push_str(&format!("{}. {} ({})\n", i + 1, artifact.stack_name, artifact.path));

        let Some(stack) = tree
            .find_by_path(&artifact.path)
            .and_then(|n| tree.as_stack(n))
        else {
            continue;
        };
        for dep in resolver::stack_dependency_reasons(tree, stack) {
            out.push_str(&format!("   depends on {}\n", tree.path(dep.target)));
            for (source, target) in dep.reasons {
                out.push_str(&format!(
                    "     {} -> {}\n",
                    tree.path(source),
                    tree.path(target)
                ));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: &str = r#"
version: "1.0"
name: test-app
constructs:
  Network:
    kind: stack
    children:
      Vpc:
        kind: resource
        type: AWS::EC2::VPC
  Service:
    kind: stack
    children:
      Task:
        kind: resource
        type: AWS::ECS::TaskDefinition
        depends_on: [Network/Vpc]
"#;

    fn write_app(dir: &Path, content: &str) -> PathBuf {
        let file = dir.join("app.yaml");
        std::fs::write(&file, content).unwrap();
        file
    }

    #[test]
    fn test_sm010_init() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("new-app");
        cmd_init(&sub).unwrap();
        assert!(sub.join("app.yaml").exists());
        // The generated manifest is itself valid
        cmd_validate(&sub.join("app.yaml")).unwrap();
    }

    #[test]
    fn test_sm010_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        write_app(dir.path(), APP);
        let result = cmd_init(dir.path());
        assert!(result.unwrap_err().contains("already exists"));
    }

    #[test]
    fn test_sm010_validate_valid() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_app(dir.path(), APP);
        cmd_validate(&file).unwrap();
    }

    #[test]
    fn test_sm010_validate_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_app(
            dir.path(),
            r#"
version: "9"
name: bad
constructs:
  Loose:
    kind: resource
    type: T
"#,
        );
        let err = cmd_validate(&file).unwrap_err();
        assert!(err.contains("2 validation error(s)"));
    }

    #[test]
    fn test_sm010_synth_writes_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_app(dir.path(), APP);
        let out = dir.path().join("cdk.out");
        cmd_synth(&file, &out, None, false).unwrap();
        assert!(out.join("Network.template.json").exists());
        assert!(out.join("Service.template.json").exists());
        let manifest = assembly::load_manifest(&out).unwrap().unwrap();
        assert_eq!(manifest.deployment_order, vec!["Network", "Service"]);
    }

    #[test]
    fn test_sm010_synth_stdout_unknown_stack() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_app(dir.path(), APP);
        let out = dir.path().join("cdk.out");
        let err = cmd_synth(&file, &out, Some("Ghost"), true).unwrap_err();
        assert!(err.contains("no stack named 'Ghost'"));
        cmd_synth(&file, &out, Some("Service"), true).unwrap();
        assert!(!out.exists());
    }

    #[test]
    fn test_sm010_synth_ambiguous_stack_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_app(
            dir.path(),
            r#"
version: "1.0"
name: dup-names
constructs:
  Blue:
    kind: stack
    stack_name: web
  Green:
    kind: stack
    stack_name: web
  Data:
    kind: stack
"#,
        );
        let out = dir.path().join("cdk.out");
        let err = cmd_synth(&file, &out, Some("web"), true).unwrap_err();
        assert_eq!(err, "stack name 'web' is ambiguous: used by Blue, Green");
        cmd_synth(&file, &out, Some("Data"), true).unwrap();

        let (_, assembly) = load_assembly(&file).unwrap();
        assert_eq!(select_stack(&assembly, "Data").unwrap().path, "Data");
        assert!(select_stack(&assembly, "Ghost").unwrap_err().contains("no stack named"));
    }

    #[test]
    fn test_sm010_synth_colliding_artifact_ids() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_app(
            dir.path(),
            r#"
version: "1.0"
name: collide
constructs:
  A-B:
    kind: stack
  A:
    kind: stack
    children:
      B:
        kind: stack
"#,
        );
        let out = dir.path().join("cdk.out");
        let err = cmd_synth(&file, &out, None, false).unwrap_err();
        assert!(err.contains("duplicate artifact id 'A-B'"));
        assert!(!out.exists());
    }

    #[test]
    fn test_sm010_graph_lists_reasons() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_app(dir.path(), APP);
        let (tree, assembly) = load_assembly(&file).unwrap();
        let text = render_graph(&tree, &assembly);
        assert_eq!(
            text,
            "1. Network (Network)\n2. Service (Service)\n   depends on Network\n     Service/Task -> Network/Vpc\n"
        );
        cmd_graph(&file).unwrap();
    }

    #[test]
    fn test_sm010_dispatch_validate() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_app(dir.path(), APP);
        dispatch(Commands::Validate { file }).unwrap();
    }

    #[test]
    fn test_sm010_missing_file() {
        let err = dispatch(Commands::Validate {
            file: PathBuf::from("/nonexistent/app.yaml"),
        })
        .unwrap_err();
        assert!(err.contains("failed to read"));
    }
}
