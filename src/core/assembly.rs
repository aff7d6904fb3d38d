//! SM-009: Cloud assembly output: templates and manifest.json, written atomically.

use super::synth::CloudAssembly;
use super::types::AssemblyManifest;
use std::path::{Path, PathBuf};

/// Name of the manifest file inside an assembly directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Derive the template path for an artifact within the output directory.
pub fn template_path(out_dir: &Path, artifact_id: &str) -> PathBuf {
    out_dir.join(format!("{}.template.json", artifact_id))
}

/// Write every template plus manifest.json. Returns the written paths,
/// templates first, manifest last.
pub fn write_assembly(out_dir: &Path, assembly: &CloudAssembly) -> Result<Vec<PathBuf>, String> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| format!("cannot create dir {}: {}", out_dir.display(), e))?;

    let mut written = Vec::with_capacity(assembly.stacks.len() + 1);
    for stack in &assembly.stacks {
        let path = template_path(out_dir, &stack.artifact_id);
        let json = serde_json::to_string_pretty(&stack.template)
            .map_err(|e| format!("serialize error: {}", e))?;
        write_atomic(&path, &json)?;
        tracing::info!(stack = %stack.stack_name, path = %path.display(), "wrote template");
        written.push(path);
    }

    let manifest_path = out_dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(&assembly.manifest())
        .map_err(|e| format!("serialize error: {}", e))?;
    write_atomic(&manifest_path, &json)?;
    written.push(manifest_path);

    Ok(written)
}

/// Load manifest.json from an assembly directory. Returns None if absent.
pub fn load_manifest(out_dir: &Path) -> Result<Option<AssemblyManifest>, String> {
    let path = out_dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let manifest: AssemblyManifest = serde_json::from_str(&content)
        .map_err(|e| format!("invalid manifest {}: {}", path.display(), e))?;
    Ok(Some(manifest))
}

/// Atomic write: temp file + rename.
fn write_atomic(path: &Path, content: &str) -> Result<(), String> {
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, content)
        .map_err(|e| format!("cannot write {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("cannot rename {} → {}: {}", tmp_path.display(), path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::ResourceProps;
    use crate::core::synth::synth;
    use crate::core::tree::ConstructTree;

    fn make_assembly() -> CloudAssembly {
        let mut t = ConstructTree::new();
        let stage = t.add_stage(t.root(), "Prod").unwrap();
        let s1 = t.add_stack(stage, "Api").unwrap();
        let s2 = t.add_stack(stage, "Data").unwrap();
        let a = t
            .add_resource(s1, "Fn", ResourceProps::new("T").with_property("Enabled", false))
            .unwrap();
        let b = t.add_resource(s2, "Table", ResourceProps::new("T")).unwrap();
        t.add_depends_on(a, b);
        synth(&t).unwrap()
    }

    #[test]
    fn test_sm009_template_path() {
        let p = template_path(Path::new("/out"), "Prod-Api");
        assert_eq!(p, PathBuf::from("/out/Prod-Api.template.json"));
    }

    #[test]
    fn test_sm009_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cdk.out");
        let assembly = make_assembly();
        let written = write_assembly(&out, &assembly).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(written.last().unwrap(), &out.join(MANIFEST_FILE));

        let manifest = load_manifest(&out).unwrap().unwrap();
        assert_eq!(manifest.deployment_order, vec!["Prod-Data", "Prod-Api"]);
        assert_eq!(manifest.artifacts["Prod-Api"].dependencies, vec!["Prod-Data"]);

        let content = std::fs::read_to_string(template_path(&out, "Prod-Api")).unwrap();
        let template: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(template["Resources"]["Fn"]["Properties"]["Enabled"], serde_json::json!(false));
    }

    #[test]
    fn test_sm009_no_temp_files_left() {
        let dir = tempfile::tempdir().unwrap();
        write_assembly(dir.path(), &make_assembly()).unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_sm009_rewrite_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        write_assembly(dir.path(), &make_assembly()).unwrap();
        let first = std::fs::read(template_path(dir.path(), "Prod-Api")).unwrap();
        write_assembly(dir.path(), &make_assembly()).unwrap();
        let second = std::fs::read(template_path(dir.path(), "Prod-Api")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sm009_load_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_manifest(dir.path()).unwrap().is_none());
    }
}
