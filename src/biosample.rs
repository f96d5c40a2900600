use tracing::{debug, info};

use crate::domain::{BioprojectAccession, Mode, Resolution, TargetField, TargetSchema};
use crate::error::ConvertError;
use crate::fuzzy::FuzzyMatcher;
use crate::prompt::{Prompter, confirm};
use crate::report::RunReport;
use crate::resolver::{FieldResolver, MappingRule, grouping_candidates};
use crate::store::{Answer, ResolutionStore};
use crate::table::{OutputTable, SourceTable};
use crate::{dedup, units};

/// FAIRe → MIMARKS pairing settled from production submissions. Fields not
/// listed here go through the fuzzy/interactive chain; `Skip` marks fields
/// a dedicated step owns.
pub const FAIRE_TO_MIMARKS: &[(&str, MappingRule)] = &[
    ("*sample_name", MappingRule::Column("samp_name")),
    ("sample_title", MappingRule::Skip),
    ("*organism", MappingRule::Column("organism")),
    ("*collection_date", MappingRule::Column("eventDate")),
    ("*depth", MappingRule::Column("maximumDepthInMeters")),
    ("*env_broad_scale", MappingRule::Column("env_broad_scale")),
    ("*env_local_scale", MappingRule::Column("env_local_scale")),
    ("*env_medium", MappingRule::Column("env_medium")),
    ("*geo_loc_name", MappingRule::Column("geo_loc_name")),
    (
        "*lat_lon",
        MappingRule::Pair("decimalLatitude", "decimalLongitude"),
    ),
    ("alkalinity", MappingRule::Column("tot_alkalinity")),
    ("ammonium", MappingRule::Column("ammonium")),
    ("chlorophyll", MappingRule::Column("chlorophyll")),
    ("collection_method", MappingRule::Column("samp_collect_method")),
    ("diss_inorg_carb", MappingRule::Column("diss_inorg_carb")),
    ("diss_inorg_nitro", MappingRule::Column("diss_inorg_nitro")),
    ("diss_org_carb", MappingRule::Column("diss_org_carb")),
    ("diss_org_nitro", MappingRule::Column("diss_org_nitro")),
    ("diss_oxygen", MappingRule::Column("diss_oxygen")),
    ("elev", MappingRule::Column("elev")),
    ("light_intensity", MappingRule::Column("light_intensity")),
    ("neg_cont_type", MappingRule::Column("neg_cont_type")),
    ("nitrate", MappingRule::Column("nitrate")),
    ("nitrite", MappingRule::Column("nitrite")),
    ("nitro", MappingRule::Column("nitro")),
    ("org_carb", MappingRule::Column("org_carb")),
    ("org_matter", MappingRule::Column("org_matter")),
    ("org_nitro", MappingRule::Column("org_nitro")),
    ("part_org_carb", MappingRule::Column("part_org_carb")),
    ("part_org_nitro", MappingRule::Column("part_org_nitro")),
    ("ph", MappingRule::Column("ph")),
    ("phosphate", MappingRule::Column("phosphate")),
    ("pos_cont_type", MappingRule::Column("pos_cont_type")),
    ("pressure", MappingRule::Column("pressure")),
    ("salinity", MappingRule::Column("salinity")),
    ("samp_collect_device", MappingRule::Column("samp_collect_device")),
    ("samp_mat_process", MappingRule::Column("samp_mat_process")),
    ("samp_size", MappingRule::Column("samp_size")),
    ("samp_store_dur", MappingRule::Column("samp_store_dur")),
    ("samp_store_loc", MappingRule::Column("samp_store_loc")),
    ("samp_store_temp", MappingRule::Column("samp_store_temp")),
    ("samp_vol_we_dna_ext", MappingRule::Column("samp_vol_we_dna_ext")),
    ("silicate", MappingRule::Column("silicate")),
    ("size_frac", MappingRule::Column("size_frac")),
    ("size_frac_low", MappingRule::Column("size_frac_low")),
    ("suspend_part_matter", MappingRule::Column("suspend_part_matter")),
    ("temp", MappingRule::Column("temp")),
    ("tidal_stage", MappingRule::Column("tidal_stage")),
    ("tot_depth_water_col", MappingRule::Column("tot_depth_water_col")),
    ("tot_diss_nitro", MappingRule::Column("tot_diss_nitro")),
    ("tot_inorg_nitro", MappingRule::Column("tot_inorg_nitro")),
    ("tot_nitro", MappingRule::Column("tot_nitro")),
    ("tot_part_carb", MappingRule::Column("tot_part_carb")),
    ("turbidity", MappingRule::Column("turbidity")),
    ("water_current", MappingRule::Column("water_current")),
    ("description", MappingRule::Skip),
];

const TITLE_DEFAULT_COLUMNS: &[&str] = &["*geo_loc_name", "*organism", "*sample_name"];
const DUPLICATE_EXCLUDE: &[&str] = &["*sample_name", "sample_title", "description"];

pub struct BioSampleJob<'a> {
    pub source: &'a SourceTable,
    pub schema: &'a TargetSchema,
    pub bioproject: Option<&'a BioprojectAccession>,
}

/// One output row per source sample, assembled fully in memory.
pub fn assemble<P: Prompter>(
    job: &BioSampleJob<'_>,
    store: &mut ResolutionStore,
    prompter: &P,
    report: &mut RunReport,
) -> Result<OutputTable, ConvertError> {
    let mode = Mode::BioSamples;
    let source = job.source;
    let schema = job.schema;

    let mut mappings = Vec::with_capacity(schema.fields.len());
    {
        let mut resolver = FieldResolver::new(
            mode,
            source,
            FAIRE_TO_MIMARKS,
            FuzzyMatcher::default(),
            store,
            prompter,
            report,
        );
        for field in &schema.fields {
            let resolution = if field.is_bioproject_accession() {
                match job.bioproject {
                    Some(accession) => Resolution::Literal(accession.to_string()),
                    None => Resolution::Unset,
                }
            } else {
                resolver.resolve(field)?
            };
            debug!(field = %field.name, ?resolution, "field mapping");
            mappings.push((field.clone(), resolution));
        }
    }

    let mut output = OutputTable::new(schema.column_names());
    for row in 0..source.row_count() {
        let mut cells = Vec::with_capacity(mappings.len());
        for (_, resolution) in &mappings {
            cells.push(render(resolution, source, row));
        }
        output.push_row(cells)?;
    }
    info!(rows = output.row_count(), "mapped source samples");

    if job.bioproject.is_none() {
        resolve_bioproject(&mut output, source, schema, mode, store, prompter, report)?;
    }

    fill_mandatory_columns(&mut output, schema, source, mode, store, prompter, report)?;

    units::annotate_units(&mut output, source, &mappings, mode, store, prompter, report)?;

    append_additional_columns(&mut output, source, &mappings, mode, store, prompter)?;

    generate_sample_titles(&mut output, mode, store, prompter)?;

    let sample_field = schema
        .fields
        .iter()
        .find(|field| field.bare_name() == "sample_name")
        .map(|field| field.name.clone())
        .unwrap_or_else(|| "*sample_name".to_string());
    let keys = (0..output.row_count())
        .map(|row| output.get(row, &sample_field).unwrap_or("").to_string())
        .collect::<Vec<_>>();
    dedup::reconcile(
        &mut output,
        &keys,
        &sample_field,
        DUPLICATE_EXCLUDE,
        mode,
        store,
        prompter,
        report,
    )?;

    Ok(output)
}

fn render(resolution: &Resolution, source: &SourceTable, row: usize) -> String {
    match resolution {
        Resolution::Literal(value) => value.clone(),
        Resolution::Column(column) => source
            .cell(row, column)
            .map(|cell| cell.to_string())
            .unwrap_or_default(),
        Resolution::ColumnPair(lat_col, lon_col) => {
            let lat = source
                .cell(row, lat_col)
                .map(|cell| cell.to_string())
                .unwrap_or_default();
            let lon = source
                .cell(row, lon_col)
                .map(|cell| cell.to_string())
                .unwrap_or_default();
            combine_lat_lon(&lat, &lon)
        }
        Resolution::Grouped { key_column, values } => source
            .cell(row, key_column)
            .map(|cell| cell.to_string())
            .and_then(|key| values.get(key.trim()).cloned())
            .unwrap_or_default(),
        Resolution::Unset => String::new(),
    }
}

/// NCBI lat_lon notation: `25.574 N 84.843 W`.
pub fn format_lat_lon(lat: f64, lon: f64) -> String {
    let ns = if lat < 0.0 { 'S' } else { 'N' };
    let ew = if lon < 0.0 { 'W' } else { 'E' };
    format!("{:.3} {ns} {:.3} {ew}", lat.abs(), lon.abs())
}

fn combine_lat_lon(lat: &str, lon: &str) -> String {
    let lat = lat.trim();
    let lon = lon.trim();
    if lat.is_empty() && lon.is_empty() {
        return String::new();
    }
    match (lat.parse::<f64>(), lon.parse::<f64>()) {
        (Ok(lat), Ok(lon)) => format_lat_lon(lat, lon),
        // both sides hold the same sentinel text ("not collected" etc.)
        _ if lat == lon => lat.to_string(),
        _ => String::new(),
    }
}

fn resolve_bioproject<P: Prompter>(
    output: &mut OutputTable,
    source: &SourceTable,
    schema: &TargetSchema,
    mode: Mode,
    store: &mut ResolutionStore,
    prompter: &P,
    report: &mut RunReport,
) -> Result<(), ConvertError> {
    let Some(field) = schema
        .fields
        .iter()
        .find(|field| field.is_bioproject_accession())
        .cloned()
    else {
        return Ok(());
    };
    let column_filled = (0..output.row_count())
        .any(|row| output.get(row, &field.name).is_some_and(|v| !v.is_empty()));
    if column_filled {
        return Ok(());
    }

    let manual = match store.get(mode, &field.name) {
        Some(_) => true,
        None => confirm(
            prompter,
            "No bioproject_accession provided. Do you want to enter values manually?",
            false,
        )?,
    };
    if !manual {
        info!("bioproject_accession left blank");
        return Ok(());
    }

    // A recorded answer settles both the same-for-all question and the
    // values themselves.
    let resolution = match store.get(mode, &field.name).cloned() {
        Some(Answer::Value(value)) => Resolution::Literal(value),
        Some(Answer::Grouped { group_by, values }) => Resolution::Grouped {
            key_column: group_by,
            values,
        },
        _ => {
            let same_for_all = confirm(
                prompter,
                "Do you want to enter the same value for all samples?",
                false,
            )?;
            if same_for_all {
                let value = prompter.ask("Enter the value to use for all samples", &[])?;
                let value = value.trim().to_string();
                store.set(mode, &field.name, Answer::Value(value.clone()));
                Resolution::Literal(value)
            } else {
                let candidates = grouping_candidates(source);
                if candidates.is_empty() {
                    info!("no suitable grouping fields, bioproject_accession left blank");
                    return Ok(());
                }
                let listed = candidates
                    .iter()
                    .enumerate()
                    .map(|(i, name)| format!("{}. {name}", i + 1))
                    .collect::<Vec<_>>()
                    .join("  ");
                let choice = prompter.ask(
                    &format!("Select a field to group samples by: {listed}"),
                    &[],
                )?;
                let key_column = parse_column_choice(&choice, &candidates)
                    .ok_or_else(|| ConvertError::MissingColumn(choice.trim().to_string()))?;
                let mut resolver = FieldResolver::new(
                    mode,
                    source,
                    &[],
                    FuzzyMatcher::default(),
                    store,
                    prompter,
                    report,
                );
                resolver.resolve_grouped(&field, &key_column)?
            }
        }
    };

    for row in 0..output.row_count() {
        let value = render(&resolution, source, row);
        output.set(row, &field.name, value);
    }
    Ok(())
}

fn parse_column_choice(choice: &str, candidates: &[String]) -> Option<String> {
    let choice = choice.trim();
    if let Ok(index) = choice.parse::<usize>() {
        if index >= 1 && index <= candidates.len() {
            return Some(candidates[index - 1].clone());
        }
        return None;
    }
    candidates.iter().find(|name| *name == choice).cloned()
}

/// Mandatory fields must not reach the output empty: a fully empty column
/// is offered the NCBI fill phrases once, and remaining holes become
/// `not collected`.
fn fill_mandatory_columns<P: Prompter>(
    output: &mut OutputTable,
    schema: &TargetSchema,
    source: &SourceTable,
    mode: Mode,
    store: &mut ResolutionStore,
    prompter: &P,
    report: &mut RunReport,
) -> Result<(), ConvertError> {
    let mut resolver = FieldResolver::new(
        mode,
        source,
        FAIRE_TO_MIMARKS,
        FuzzyMatcher::default(),
        store,
        prompter,
        report,
    );
    for field in &schema.fields {
        if !field.required {
            continue;
        }
        let empty = (0..output.row_count())
            .all(|row| output.get(row, &field.name).is_none_or(str::is_empty));
        if empty && output.row_count() > 0 {
            let fill = resolver.fill_mandatory(field)?;
            output.fill_column(&field.name, &fill);
        }
    }

    for field in &schema.fields {
        if !field.required {
            continue;
        }
        for row in 0..output.row_count() {
            if output.get(row, &field.name).is_some_and(str::is_empty) {
                output.set(row, &field.name, "not collected".to_string());
            }
        }
    }
    Ok(())
}

/// Unmapped, non-empty FAIRe columns appended after the template fields.
fn append_additional_columns<P: Prompter>(
    output: &mut OutputTable,
    source: &SourceTable,
    mappings: &[(TargetField, Resolution)],
    mode: Mode,
    store: &mut ResolutionStore,
    prompter: &P,
) -> Result<(), ConvertError> {
    let mut used = Vec::new();
    for (_, resolution) in mappings {
        match resolution {
            Resolution::Column(column) => used.push(column.clone()),
            Resolution::ColumnPair(a, b) => {
                used.push(a.clone());
                used.push(b.clone());
            }
            Resolution::Grouped { key_column, .. } => used.push(key_column.clone()),
            _ => {}
        }
    }

    let unused = source
        .column_names()
        .iter()
        .filter(|name| !used.contains(name) && source.non_empty_count(name) > 0)
        .cloned()
        .collect::<Vec<_>>();
    if unused.is_empty() {
        return Ok(());
    }

    let add_all = match store.get(mode, "add_all_additional_columns") {
        Some(Answer::Value(saved)) => saved == "y",
        _ => {
            let choice = confirm(
                prompter,
                &format!(
                    "Found {} additional FAIRe columns ({}). Add ALL of them to the output?",
                    unused.len(),
                    unused.join(", ")
                ),
                true,
            )?;
            store.set(
                mode,
                "add_all_additional_columns",
                Answer::Value(if choice { "y" } else { "n" }.to_string()),
            );
            choice
        }
    };

    let selected = if add_all {
        unused
    } else {
        let excluded = match store.get(mode, "excluded_additional_columns") {
            Some(Answer::Value(saved)) => saved.clone(),
            _ => {
                let answer = prompter.ask(
                    "Enter column names separated by commas to EXCLUDE (or 'none')",
                    &[],
                )?;
                let answer = answer.trim().to_string();
                store.set(
                    mode,
                    "excluded_additional_columns",
                    Answer::Value(answer.clone()),
                );
                answer
            }
        };
        let excluded = excluded
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("none"))
            .map(String::from)
            .collect::<Vec<_>>();
        unused
            .into_iter()
            .filter(|name| !excluded.contains(name))
            .collect()
    };

    for column in selected {
        let values = (0..output.row_count())
            .map(|row| {
                source
                    .cell(row, &column)
                    .map(|cell| cell.to_string())
                    .unwrap_or_default()
            })
            .collect();
        output.append_column(column, values);
    }
    Ok(())
}

fn generate_sample_titles<P: Prompter>(
    output: &mut OutputTable,
    mode: Mode,
    store: &mut ResolutionStore,
    prompter: &P,
) -> Result<(), ConvertError> {
    if output.column_index("sample_title").is_none() {
        return Ok(());
    }

    let add_titles = match store.get(mode, "sample_title") {
        Some(Answer::Value(saved)) => !saved.is_empty(),
        _ => {
            let choice = confirm(
                prompter,
                "Do you want to add values in the sample_title column?",
                false,
            )?;
            if !choice {
                store.set(mode, "sample_title", Answer::Value(String::new()));
            }
            choice
        }
    };
    if !add_titles {
        return Ok(());
    }

    let columns = match store.get(mode, "sample_title") {
        Some(Answer::Value(saved)) if !saved.is_empty() => saved
            .split(',')
            .map(str::trim)
            .map(String::from)
            .collect::<Vec<_>>(),
        _ => {
            let use_default = confirm(
                prompter,
                &format!(
                    "Use the default title columns: {}?",
                    TITLE_DEFAULT_COLUMNS.join(", ")
                ),
                true,
            )?;
            let columns = if use_default {
                TITLE_DEFAULT_COLUMNS
                    .iter()
                    .map(|name| (*name).to_string())
                    .collect::<Vec<_>>()
            } else {
                let answer =
                    prompter.ask("Enter column names to concatenate, separated by commas", &[])?;
                answer
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect()
            };
            store.set(mode, "sample_title", Answer::Value(columns.join(",")));
            columns
        }
    };

    for row in 0..output.row_count() {
        let parts = columns
            .iter()
            .filter_map(|column| output.get(row, column))
            .filter(|value| !value.is_empty())
            .map(String::from)
            .collect::<Vec<_>>();
        let title = if parts.is_empty() {
            "missing".to_string()
        } else {
            parts.join(" ")
        };
        output.set(row, "sample_title", title);
    }
    Ok(())
}
