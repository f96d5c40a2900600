use std::fs;
use std::io::Write;

use camino::Utf8Path;
use csv::{ReaderBuilder, WriterBuilder};

use crate::domain::Cell;
use crate::error::ConvertError;

/// One loaded metadata sheet: ordered column names with equal-length cell
/// vectors. Immutable after load.
#[derive(Debug, Clone)]
pub struct SourceTable {
    columns: Vec<String>,
    data: Vec<Vec<Cell>>,
    rows: usize,
}

impl SourceTable {
    pub fn from_columns(columns: Vec<(String, Vec<Cell>)>) -> Result<Self, ConvertError> {
        let rows = columns.first().map(|(_, cells)| cells.len()).unwrap_or(0);
        for (name, cells) in &columns {
            if cells.len() != rows {
                return Err(ConvertError::TableParse(format!(
                    "column '{name}' has {} cells, expected {rows}",
                    cells.len()
                )));
            }
        }
        let (names, data) = columns.into_iter().unzip();
        Ok(Self {
            columns: names,
            data,
            rows,
        })
    }

    pub fn read_tsv(path: &Utf8Path) -> Result<Self, ConvertError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_path(path.as_std_path())
            .map_err(|err| ConvertError::TableRead(path.to_path_buf(), err.to_string()))?;

        let headers = reader
            .headers()
            .map_err(|err| ConvertError::TableRead(path.to_path_buf(), err.to_string()))?
            .iter()
            .map(|header| header.trim().to_string())
            .collect::<Vec<_>>();

        let mut data = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record
                .map_err(|err| ConvertError::TableRead(path.to_path_buf(), err.to_string()))?;
            for (idx, column) in data.iter_mut().enumerate() {
                let raw = record.get(idx).unwrap_or("");
                column.push(Cell::parse(raw));
            }
        }

        let rows = data.first().map(Vec::len).unwrap_or(0);
        Ok(Self {
            columns: headers,
            data,
            rows,
        })
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|col| col == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        let idx = self.columns.iter().position(|col| col == name)?;
        Some(&self.data[idx])
    }

    pub fn require_column(&self, name: &str) -> Result<&[Cell], ConvertError> {
        self.column(name)
            .ok_or_else(|| ConvertError::MissingColumn(name.to_string()))
    }

    pub fn cell(&self, row: usize, name: &str) -> Option<&Cell> {
        self.column(name).and_then(|cells| cells.get(row))
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Distinct non-empty values of a column, in first-seen order.
    pub fn distinct_values(&self, name: &str) -> Vec<String> {
        let mut seen = Vec::new();
        if let Some(cells) = self.column(name) {
            for cell in cells {
                if cell.is_empty() {
                    continue;
                }
                let value = cell.to_string();
                if !seen.contains(&value) {
                    seen.push(value);
                }
            }
        }
        seen
    }

    pub fn non_empty_count(&self, name: &str) -> usize {
        self.column(name)
            .map(|cells| cells.iter().filter(|cell| !cell.is_empty()).count())
            .unwrap_or(0)
    }
}

/// The assembled output: row-major string cells under the target schema's
/// column order. Built fully in memory, written once.
#[derive(Debug, Clone)]
pub struct OutputTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl OutputTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col == name)
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), ConvertError> {
        if row.len() != self.columns.len() {
            return Err(ConvertError::TableParse(format!(
                "row has {} cells, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, row: usize, name: &str) -> Option<&str> {
        let idx = self.column_index(name)?;
        self.rows.get(row).map(|cells| cells[idx].as_str())
    }

    pub fn set(&mut self, row: usize, name: &str, value: String) {
        if let Some(idx) = self.column_index(name) {
            if let Some(cells) = self.rows.get_mut(row) {
                cells[idx] = value;
            }
        }
    }

    pub fn fill_column(&mut self, name: &str, value: &str) {
        if let Some(idx) = self.column_index(name) {
            for row in &mut self.rows {
                row[idx] = value.to_string();
            }
        }
    }

    pub fn append_column(&mut self, name: String, values: Vec<String>) {
        self.columns.push(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    pub fn remove_row(&mut self, row: usize) {
        self.rows.remove(row);
    }

    /// Write the table as TSV, replaying `preamble` lines above the header.
    /// Goes through a temp file in the target directory so an interrupted
    /// run leaves no partial output.
    pub fn write_tsv(&self, path: &Utf8Path, preamble: &[String]) -> Result<(), ConvertError> {
        let parent = path
            .parent()
            .ok_or_else(|| ConvertError::Filesystem("invalid output path".to_string()))?;
        if !parent.as_str().is_empty() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| ConvertError::Filesystem(err.to_string()))?;
        }
        let dir = if parent.as_str().is_empty() {
            Utf8Path::new(".")
        } else {
            parent
        };
        let mut temp = tempfile::Builder::new()
            .prefix("faire2ncbi-out")
            .tempfile_in(dir.as_std_path())
            .map_err(|err| ConvertError::Filesystem(err.to_string()))?;

        for line in preamble {
            writeln!(temp, "{line}").map_err(|err| ConvertError::Filesystem(err.to_string()))?;
        }
        {
            let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(&mut temp);
            writer
                .write_record(&self.columns)
                .map_err(|err| ConvertError::Filesystem(err.to_string()))?;
            for row in &self.rows {
                writer
                    .write_record(row)
                    .map_err(|err| ConvertError::Filesystem(err.to_string()))?;
            }
            writer
                .flush()
                .map_err(|err| ConvertError::Filesystem(err.to_string()))?;
        }
        if path.as_std_path().exists() {
            fs::remove_file(path.as_std_path())
                .map_err(|err| ConvertError::Filesystem(err.to_string()))?;
        }
        temp.persist(path.as_std_path())
            .map_err(|err| ConvertError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// Project-level metadata sheet: one row per term, a `project_level` column
/// and one column per assay.
#[derive(Debug, Clone)]
pub struct ProjectMetadata {
    table: SourceTable,
}

impl ProjectMetadata {
    pub fn new(table: SourceTable) -> Self {
        Self { table }
    }

    pub fn read_tsv(path: &Utf8Path) -> Result<Self, ConvertError> {
        Ok(Self::new(SourceTable::read_tsv(path)?))
    }

    fn term_row(&self, term: &str) -> Option<usize> {
        let terms = self.table.column("term_name")?;
        terms.iter().position(|cell| {
            cell.to_string().trim().eq_ignore_ascii_case(term)
        })
    }

    pub fn project_value(&self, term: &str) -> Option<String> {
        let row = self.term_row(term)?;
        let cell = self.table.cell(row, "project_level")?;
        let value = cell.to_string().trim().to_string();
        (!value.is_empty() && !value.eq_ignore_ascii_case("none")).then_some(value)
    }

    pub fn assay_value(&self, term: &str, assay: &str) -> Option<String> {
        let row = self.term_row(term)?;
        let cell = self.table.cell(row, assay)?;
        let value = cell.to_string().trim().to_string();
        (!value.is_empty() && !value.eq_ignore_ascii_case("none")).then_some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Cell;

    fn table() -> SourceTable {
        SourceTable::from_columns(vec![
            (
                "samp_name".to_string(),
                vec![Cell::text("S1"), Cell::text("S2"), Cell::text("S2")],
            ),
            (
                "depth".to_string(),
                vec![Cell::Number(10.0), Cell::Number(20.0), Cell::Empty],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn column_access() {
        let table = table();
        assert_eq!(table.row_count(), 3);
        assert!(table.has_column("depth"));
        assert_eq!(table.cell(0, "samp_name"), Some(&Cell::text("S1")));
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn distinct_values_keep_first_seen_order() {
        let table = table();
        assert_eq!(table.distinct_values("samp_name"), vec!["S1", "S2"]);
        assert_eq!(table.non_empty_count("depth"), 2);
    }

    #[test]
    fn mismatched_column_lengths_rejected() {
        let result = SourceTable::from_columns(vec![
            ("a".to_string(), vec![Cell::Empty]),
            ("b".to_string(), vec![]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn output_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(temp.path().join("out.tsv")).unwrap();

        let mut output = OutputTable::new(vec!["a".to_string(), "b".to_string()]);
        output
            .push_row(vec!["1".to_string(), "x".to_string()])
            .unwrap();
        output
            .write_tsv(&path, &["# comment".to_string()])
            .unwrap();

        let written = std::fs::read_to_string(path.as_std_path()).unwrap();
        assert!(written.starts_with("# comment\n"));
        assert!(written.contains("a\tb"));
        assert!(written.contains("1\tx"));
    }

    #[test]
    fn project_metadata_lookup() {
        let table = SourceTable::from_columns(vec![
            (
                "term_name".to_string(),
                vec![Cell::text("platform"), Cell::text("seq_kit")],
            ),
            (
                "project_level".to_string(),
                vec![Cell::text("ILLUMINA"), Cell::Empty],
            ),
            (
                "16S".to_string(),
                vec![Cell::text("ILLUMINA"), Cell::text("Illumina MiSeq")],
            ),
        ])
        .unwrap();
        let project = ProjectMetadata::new(table);

        assert_eq!(project.project_value("platform").as_deref(), Some("ILLUMINA"));
        assert_eq!(project.project_value("seq_kit"), None);
        assert_eq!(
            project.assay_value("seq_kit", "16S").as_deref(),
            Some("Illumina MiSeq")
        );
    }
}
