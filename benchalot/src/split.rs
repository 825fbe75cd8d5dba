//! Configuration Splitting
//!
//! `--split VAR` slices the matrix into one partial configuration per value
//! of VAR so slices can run on separate machines. Each partial config keeps
//! everything except the matrix slice and gets a single CSV result block;
//! the printed hint shows how to merge the partial results afterwards.

use anyhow::{bail, Context, Result};
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// Write one partial configuration per value of `variable` to `out/`.
///
/// Operates on the raw YAML document so unrelated sections survive verbatim.
pub fn split_config(config_path: &Path, variable: &str) -> Result<()> {
    split_config_into(config_path, variable, Path::new("out"))
}

fn split_config_into(config_path: &Path, variable: &str, out_dir: &Path) -> Result<()> {
    let text = std::fs::read_to_string(config_path)
        .with_context(|| format!("cannot read configuration file '{}'", config_path.display()))?;
    let document: Value =
        serde_yaml::from_str(&text).context("configuration is not valid YAML")?;
    let Value::Mapping(root) = document else {
        bail!("configuration root must be a mapping");
    };

    let values = matrix_values(&root, variable)?;
    let base_name = config_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("config");

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("cannot create '{}' directory", out_dir.display()))?;

    let mut partial_csvs = Vec::with_capacity(values.len());
    for (index, value) in values.iter().enumerate() {
        let partial_csv = format!("{}.part{}.csv", base_name, index);

        let mut partial = root.clone();
        set_matrix_slice(&mut partial, variable, value.clone());
        set_partial_output(&mut partial, &partial_csv);

        let path = out_dir.join(format!("{}.part{}.yml", base_name, index));
        let yaml = serde_yaml::to_string(&Value::Mapping(partial))?;
        std::fs::write(&path, yaml)
            .with_context(|| format!("cannot write '{}'", path.display()))?;
        tracing::info!("wrote {}", path.display());
        partial_csvs.push(partial_csv);
    }

    println!(
        "{} config files were created in '{}'.",
        values.len(),
        out_dir.display()
    );
    println!("To combine the results of their execution use:");
    let (first, rest) = partial_csvs.split_first().expect("at least one value");
    let mut merge = format!(
        "\tbenchalot {} --results-from-csv {}",
        config_path.display(),
        first
    );
    for csv in rest {
        merge.push_str(&format!(" --include {}", csv));
    }
    println!("{}", merge);
    Ok(())
}

fn matrix_values(root: &Mapping, variable: &str) -> Result<Vec<Value>> {
    let matrix = root
        .get("matrix")
        .and_then(Value::as_mapping)
        .ok_or_else(|| anyhow::anyhow!("configuration has no 'matrix' section to split"))?;
    let values = matrix
        .get(variable)
        .and_then(Value::as_sequence)
        .ok_or_else(|| anyhow::anyhow!("matrix.{}: variable not found", variable))?;
    if values.is_empty() {
        bail!("matrix.{}: value list is empty", variable);
    }
    Ok(values.clone())
}

fn set_matrix_slice(config: &mut Mapping, variable: &str, value: Value) {
    if let Some(matrix) = config
        .get_mut("matrix")
        .and_then(Value::as_mapping_mut)
    {
        matrix.insert(Value::from(variable), Value::Sequence(vec![value]));
    }
}

fn set_partial_output(config: &mut Mapping, filename: &str) {
    let mut block = Mapping::new();
    block.insert(Value::from("format"), Value::from("csv"));
    block.insert(Value::from("filename"), Value::from(filename));
    let mut results = Mapping::new();
    results.insert(Value::from("partial-output"), Value::Mapping(block));
    config.insert(Value::from("results"), Value::Mapping(results));
}
