//! The merge pipeline: group models, resolve tables, reduce the referenced keys to the master
//! table capacity, remap every model and write the results.

use crate::binary::{decode_model, decode_table, peek_table_name};
use crate::extract::{KeyValues, collect};
use crate::lut::{KMeansParams, LutReduction, build_lut};
use crate::quantize::remap;
use crate::writer::{apply_indices, encode_model, rewrite_table};
use crate::{Error, LutKind, ModelFile, TableFile};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const TABLE_EXTENSION: &str = "tkl";

/// Largest LUT addressable by the 16-bit keyframe indices.
pub const MAX_LUT_ENTRIES: usize = u16::MAX as usize + 1;

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MergeOptions {
    /// Name of the table whose slot counts bound the output.
    pub master_table: String,
    /// Case-insensitive file name fragments. Models sharing a fragment are assumed to carry
    /// identical animation data, so only the first of them is sampled.
    pub families: Vec<String>,
    pub location_clustering: KMeansParams,
    pub rotation_clustering: KMeansParams,
    /// Fail instead of warning when distinct values exceed the master capacity.
    pub strict_capacity: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            master_table: String::new(),
            families: Vec::new(),
            location_clustering: KMeansParams::locations(),
            rotation_clustering: KMeansParams::rotations(),
            strict_capacity: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MergeConfig {
    pub model_paths: Vec<PathBuf>,
    pub output_dir: PathBuf,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub options: MergeOptions,
}

impl MergeConfig {
    pub fn new(
        model_paths: Vec<PathBuf>,
        output_dir: impl Into<PathBuf>,
        master_table: impl Into<String>,
    ) -> Self {
        Self {
            model_paths,
            output_dir: output_dir.into(),
            options: MergeOptions {
                master_table: master_table.into(),
                ..MergeOptions::default()
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelInput {
    /// File name, reused for the output.
    pub name: String,
    /// Key of the table this model reads from in [`MergeInput::tables`].
    pub table_key: String,
    pub bytes: Vec<u8>,
}

/// Fully buffered merge inputs.
#[derive(Clone, Debug, Default)]
pub struct MergeInput {
    pub models: Vec<ModelInput>,
    pub tables: HashMap<String, Vec<u8>>,
}

impl MergeInput {
    /// Adds a model keyed by the (lowercased) name of the table it references.
    pub fn push_model(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> Result<(), Error> {
        let name = name.into();
        let table = peek_table_name(&bytes).map_err(|e| e.in_file(&name))?;
        self.models.push(ModelInput {
            name,
            table_key: table.to_lowercase(),
            bytes,
        });
        Ok(())
    }

    /// Adds a table keyed by its (lowercased) header name. Header names hold at most six bytes
    /// while model references hold eight; use [`Self::push_table_as`] for longer references.
    pub fn push_table(&mut self, bytes: Vec<u8>) -> Result<(), Error> {
        let name = decode_table(&bytes)?.name();
        self.push_table_as(name, bytes)
    }

    /// Adds a table under the reference models use for it (usually its file stem).
    pub fn push_table_as(
        &mut self,
        reference: impl AsRef<str>,
        bytes: Vec<u8>,
    ) -> Result<(), Error> {
        let reference = reference.as_ref();
        decode_table(&bytes).map_err(|e| e.in_file(reference))?;
        self.tables.insert(reference.to_lowercase(), bytes);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MergeReport {
    /// Name of the output table; every output model references it.
    pub table: String,
    pub models: Vec<String>,
    pub families: usize,
    pub locations: LutReduction,
    pub rotations: LutReduction,
}

#[derive(Clone, Debug)]
pub struct MergeOutput {
    pub table_file: String,
    pub table: Vec<u8>,
    /// `(file name, bytes)` per input model, in input order.
    pub models: Vec<(String, Vec<u8>)>,
    pub report: MergeReport,
}

/// Runs a merge from files on disk. Nothing is written unless every output was computed.
pub fn merge(config: &MergeConfig) -> Result<MergeReport, Error> {
    let (input, sources) = load_input(&config.model_paths)?;
    let output = merge_in_memory(&input, &config.options)?;
    write_output(&config.output_dir, &sources, &output)?;
    tracing::info!(
        "wrote {} models and {} to {}",
        output.models.len(),
        output.table_file,
        config.output_dir.display()
    );
    Ok(output.report)
}

/// Reads every model and the tables they reference (each once, from the model's directory).
/// Returns the inputs and the paths they were read from.
pub fn load_input(model_paths: &[PathBuf]) -> Result<(MergeInput, Vec<PathBuf>), Error> {
    let mut input = MergeInput::default();
    let mut sources = Vec::with_capacity(model_paths.len() * 2);
    for path in model_paths {
        tracing::debug!("reading {}", path.display());
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        let table = peek_table_name(&bytes).map_err(|e| e.in_file(path))?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let table_path = dir.join(format!("{table}.{TABLE_EXTENSION}"));
        let table_key = table_path.to_string_lossy().to_lowercase();

        if !input.tables.contains_key(&table_key) {
            tracing::debug!("reading {}", table_path.display());
            let table_bytes = match fs::read(&table_path) {
                Ok(b) => b,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(Error::UnknownTable {
                        model: path.display().to_string(),
                        table,
                    });
                }
                Err(e) => return Err(Error::io(&table_path, e)),
            };
            input.tables.insert(table_key.clone(), table_bytes);
            sources.push(table_path);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        input.models.push(ModelInput {
            name,
            table_key,
            bytes,
        });
        sources.push(path.clone());
    }
    Ok((input, sources))
}

/// Index of the family a model belongs to: the first matching fragment, or a family of its own.
fn family_of(name: &str, families: &[String], index: usize) -> usize {
    let name = name.to_lowercase();
    families
        .iter()
        .position(|f| !f.is_empty() && name.contains(&f.to_lowercase()))
        .unwrap_or(families.len() + index)
}

/// The IO-free merge pipeline.
pub fn merge_in_memory(input: &MergeInput, options: &MergeOptions) -> Result<MergeOutput, Error> {
    tracing::info!(
        "merging {} models into table '{}'",
        input.models.len(),
        options.master_table
    );

    let mut models: Vec<ModelFile> = Vec::with_capacity(input.models.len());
    let mut tables: HashMap<&str, TableFile> = HashMap::new();
    for m in &input.models {
        let model = decode_model(&m.bytes).map_err(|e| e.in_file(&m.name))?;
        if !tables.contains_key(m.table_key.as_str()) {
            let bytes = input
                .tables
                .get(&m.table_key)
                .ok_or_else(|| Error::UnknownTable {
                    model: m.name.clone(),
                    table: model.header.table_name(),
                })?;
            let table = decode_table(bytes).map_err(|e| e.in_file(&m.table_key))?;
            tables.insert(m.table_key.as_str(), table);
        }
        models.push(model);
    }

    let master = input
        .models
        .iter()
        .filter_map(|m| tables.get(m.table_key.as_str()))
        .find(|t| t.name().eq_ignore_ascii_case(&options.master_table))
        .ok_or_else(|| Error::UnknownMasterTable {
            name: options.master_table.clone(),
        })?;
    let master_name = master.name();

    let mut values: Vec<KeyValues> = Vec::with_capacity(models.len());
    for (m, model) in input.models.iter().zip(&models) {
        let indices = collect(model);
        let table = &tables[m.table_key.as_str()];
        let resolved = indices.resolve(table).map_err(|e| e.in_file(&m.name))?;
        tracing::debug!(
            "{}: {} location and {} rotation keys from '{}'",
            m.name,
            resolved.locations.len(),
            resolved.rotations.len(),
            indices.table
        );
        values.push(resolved);
    }

    // Only the first model of each family contributes to the pooled values.
    let mut sampled_families = Vec::new();
    let mut pooled = KeyValues::default();
    for (i, (m, v)) in input.models.iter().zip(&values).enumerate() {
        let family = family_of(&m.name, &options.families, i);
        if sampled_families.contains(&family) {
            continue;
        }
        sampled_families.push(family);
        pooled.locations.extend_from_slice(&v.locations);
        pooled.rotations.extend_from_slice(&v.rotations);
    }

    let loc_capacity = (master.header.num_loc as usize).min(MAX_LUT_ENTRIES);
    let rot_capacity = (master.header.num_rot as usize).min(MAX_LUT_ENTRIES);
    let (loc_lut, locations) = build_lut(
        &pooled.locations,
        LutKind::Location,
        loc_capacity,
        &options.location_clustering,
    );
    let (rot_lut, rotations) = build_lut(
        &pooled.rotations,
        LutKind::Rotation,
        rot_capacity,
        &options.rotation_clustering,
    );
    for reduction in [&locations, &rotations] {
        check_reduction(reduction, options.strict_capacity)?;
    }

    let table = rewrite_table(&master.header, &loc_lut, &rot_lut)
        .map_err(|e| e.in_file(&master_name))?;

    let mut outputs = Vec::with_capacity(models.len());
    for ((m, model), v) in input.models.iter().zip(&models).zip(&values) {
        let new_locations =
            remap(&v.locations, &loc_lut, LutKind::Location).map_err(|e| e.in_file(&m.name))?;
        let new_rotations =
            remap(&v.rotations, &rot_lut, LutKind::Rotation).map_err(|e| e.in_file(&m.name))?;
        let mut model = model.clone();
        apply_indices(&mut model, &new_locations, &new_rotations)
            .map_err(|e| e.in_file(&m.name))?;
        let bytes = encode_model(&m.bytes, &model, &master_name).map_err(|e| e.in_file(&m.name))?;
        outputs.push((m.name.clone(), bytes));
    }

    Ok(MergeOutput {
        table_file: format!("{master_name}.{TABLE_EXTENSION}"),
        table,
        report: MergeReport {
            table: master_name,
            models: outputs.iter().map(|(name, _)| name.clone()).collect(),
            families: sampled_families.len(),
            locations,
            rotations,
        },
        models: outputs,
    })
}

fn check_reduction(reduction: &LutReduction, strict: bool) -> Result<(), Error> {
    tracing::info!(
        "{}: {} referenced, {} unique, {} slots, {} centroids",
        reduction.lut,
        reduction.referenced,
        reduction.unique,
        reduction.capacity,
        reduction.size
    );
    if !reduction.is_lossy() {
        return Ok(());
    }
    if strict {
        return Err(Error::Capacity {
            lut: reduction.lut,
            required: reduction.unique,
            capacity: reduction.capacity,
        });
    }
    tracing::warn!(
        "lossy reduction: {} distinct {} values share {} slots",
        reduction.unique,
        reduction.lut,
        reduction.capacity
    );
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Writes every output file into `dir`, refusing to overwrite any of `sources` or to write two
/// outputs to the same path. On failure the outputs written so far are removed again.
pub fn write_output(dir: &Path, sources: &[PathBuf], output: &MergeOutput) -> Result<(), Error> {
    let mut targets: Vec<(PathBuf, &[u8])> = Vec::with_capacity(output.models.len() + 1);
    targets.push((dir.join(&output.table_file), output.table.as_slice()));
    for (name, bytes) in &output.models {
        targets.push((dir.join(name), bytes.as_slice()));
    }

    for (i, (path, _)) in targets.iter().enumerate() {
        if sources.iter().any(|s| same_file(s, path)) {
            return Err(Error::io(
                path,
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "output would overwrite an input file",
                ),
            ));
        }
        if targets[..i].iter().any(|(p, _)| p == path) {
            return Err(Error::io(
                path,
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "two outputs share this file name",
                ),
            ));
        }
    }

    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    // Staged under temporary names, then renamed into place.
    let mut staged = Vec::with_capacity(targets.len());
    for (path, bytes) in &targets {
        let partial = staging_path(path);
        if let Err(e) = fs::write(&partial, bytes) {
            staged.push(partial);
            remove_all(&staged);
            return Err(Error::io(path, e));
        }
        staged.push(partial);
    }

    for (i, ((path, bytes), partial)) in targets.iter().zip(&staged).enumerate() {
        if let Err(e) = fs::rename(partial, path) {
            remove_all(&staged[i..]);
            remove_all(targets[..i].iter().map(|(p, _)| p));
            return Err(Error::io(path, e));
        }
        tracing::debug!("wrote {} ({} bytes)", path.display(), bytes.len());
    }
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".partial");
    path.with_file_name(name)
}

fn remove_all<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) {
    for path in paths {
        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                tracing::warn!("failed to remove {}: {e}", path.display());
            }
            _ => {}
        }
    }
}
