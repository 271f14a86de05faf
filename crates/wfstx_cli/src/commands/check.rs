//! Check command: parse a script without running it.

use crate::script::Script;
use std::path::Path;

/// Runs the check command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let script = Script::load(path)?;
    script.check_bindings()?;

    let seeded: usize = script.features.values().map(Vec::len).sum();
    println!("Script: {}", path.display());
    println!("  Types: {}", script.type_names().len());
    println!("  Seed features: {seeded}");
    println!("  Steps: {}", script.steps.len());
    for (position, step) in script.steps.iter().enumerate() {
        println!("    [{position}] {}", step.op());
    }
    println!("OK");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn accepts_valid_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.json");
        fs::write(
            &path,
            r#"{"types": ["roads"], "steps": [
                {"op": "get_feature_with_lock", "bind": "g",
                 "request": {"queries": [{"type_name": "roads"}]}},
                {"op": "release_lock", "lock_id": "$g"}]}"#,
        )
        .unwrap();
        assert!(run(&path).is_ok());
    }

    #[test]
    fn rejects_malformed_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"steps": [{"op": "explode"}]}"#).unwrap();
        assert!(run(&path).is_err());
    }
}
