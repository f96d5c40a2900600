use std::fs;

use camino::Utf8Path;

use crate::domain::{FieldType, TargetField, TargetSchema};
use crate::error::ConvertError;

/// MIMARKS templates put the tab-separated header on line 12; everything
/// above it is submission guidance that must be replayed into the output.
const MIMARKS_HEADER_LINE: usize = 11;

/// MIMARKS fields whose cells are numeric measurements. Values in these
/// columns carry a unit suffix in the submission file.
const NUMERIC_FIELDS: &[&str] = &[
    "depth",
    "alkalinity",
    "altitude",
    "ammonium",
    "chlorophyll",
    "conduc",
    "density",
    "diss_inorg_carb",
    "diss_inorg_nitro",
    "diss_org_carb",
    "diss_org_nitro",
    "diss_oxygen",
    "elev",
    "light_intensity",
    "nitrate",
    "nitrite",
    "nitro",
    "org_carb",
    "org_matter",
    "org_nitro",
    "part_org_carb",
    "part_org_nitro",
    "ph",
    "phosphate",
    "pressure",
    "salinity",
    "samp_size",
    "samp_store_temp",
    "samp_vol_we_dna_ext",
    "silicate",
    "size_frac_low",
    "size_frac_up",
    "suspend_part_matter",
    "temp",
    "tot_depth_water_col",
    "tot_diss_nitro",
    "tot_inorg_nitro",
    "tot_nitro",
    "tot_part_carb",
    "turbidity",
    "water_current",
];

/// Numeric fields that are dimensionless by definition.
const UNITLESS_FIELDS: &[&str] = &["ph"];

/// SRA submission fields NCBI rejects when blank.
const SRA_REQUIRED_FIELDS: &[&str] = &[
    "sample_name",
    "library_ID",
    "title",
    "library_strategy",
    "library_source",
    "library_selection",
    "library_layout",
    "platform",
    "design_description",
    "filetype",
    "filename",
];

pub fn read_biosample_template(path: &Utf8Path) -> Result<TargetSchema, ConvertError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|_| ConvertError::TemplateRead(path.to_path_buf()))?;
    let lines = content.lines().collect::<Vec<_>>();
    if lines.len() <= MIMARKS_HEADER_LINE {
        return Err(ConvertError::TemplateParse(format!(
            "template must have at least {} lines, found {}",
            MIMARKS_HEADER_LINE + 1,
            lines.len()
        )));
    }

    let preamble = lines[..MIMARKS_HEADER_LINE]
        .iter()
        .map(|line| line.trim_end().to_string())
        .collect();
    let names = lines[MIMARKS_HEADER_LINE]
        .split('\t')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect::<Vec<_>>();
    if names.is_empty() {
        return Err(ConvertError::TemplateParse(
            "template header line is empty".to_string(),
        ));
    }

    Ok(biosample_schema(names, preamble))
}

pub fn biosample_schema(names: Vec<String>, preamble: Vec<String>) -> TargetSchema {
    let fields = names
        .into_iter()
        .map(|name| {
            let bare = name.trim_start_matches('*').to_string();
            let numeric = NUMERIC_FIELDS.contains(&bare.as_str());
            TargetField {
                required: name.starts_with('*'),
                expected_type: if numeric {
                    FieldType::Numeric
                } else {
                    FieldType::Text
                },
                unit_required: numeric && !UNITLESS_FIELDS.contains(&bare.as_str()),
                name,
            }
        })
        .collect();
    TargetSchema { fields, preamble }
}

pub fn read_sra_template(path: &Utf8Path) -> Result<TargetSchema, ConvertError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|_| ConvertError::TemplateRead(path.to_path_buf()))?;
    let header = content
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| ConvertError::TemplateParse("template is empty".to_string()))?;

    let names = header
        .split('\t')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect::<Vec<_>>();
    Ok(sra_schema(names))
}

pub fn sra_schema(names: Vec<String>) -> TargetSchema {
    let fields = names
        .into_iter()
        .map(|name| TargetField {
            required: SRA_REQUIRED_FIELDS.contains(&name.as_str()),
            expected_type: FieldType::Text,
            unit_required: false,
            name,
        })
        .collect();
    TargetSchema {
        fields,
        preamble: Vec::new(),
    }
}
