use thiserror::Error;

use super::types::AllocationCandidate;

pub const CSV_HEADER: &str = "Emp Total,Trad,Roth,Brokerage,Match,After-Tax FV,Tax Now";
pub const CSV_FILE_NAME: &str = "contribution-optimizer.csv";
const COLUMNS: usize = 7;

#[derive(Debug, Error, PartialEq)]
pub enum CsvError {
    #[error("missing header row")]
    MissingHeader,
    #[error("unexpected header {found:?}")]
    UnexpectedHeader { found: String },
    #[error("line {line}: expected 7 columns, found {found}")]
    ColumnCount { line: usize, found: usize },
    #[error("line {line}: {value:?} is not a number")]
    NotANumber { line: usize, value: String },
}

/// One header line followed by one line per candidate, no trailing newline.
pub fn candidates_to_csv(candidates: &[AllocationCandidate]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + candidates.len() * 64);
    out.push_str(CSV_HEADER);
    for c in candidates {
        out.push('\n');
        let cells = [
            c.employee_deferral_total,
            c.traditional_portion,
            c.roth_portion,
            c.brokerage_portion,
            c.employer_match,
            c.after_tax_future_value,
            c.current_year_tax,
        ];
        let row: Vec<String> = cells.iter().map(|v| v.to_string()).collect();
        out.push_str(&row.join(","));
    }
    out
}

pub fn parse_candidates_csv(text: &str) -> Result<Vec<AllocationCandidate>, CsvError> {
    let mut lines = text.lines().enumerate();
    let Some((_, header)) = lines.next() else {
        return Err(CsvError::MissingHeader);
    };
    if header.trim() != CSV_HEADER {
        return Err(CsvError::UnexpectedHeader {
            found: header.to_string(),
        });
    }

    let mut out = Vec::new();
    for (idx, line) in lines {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split(',').collect();
        if cells.len() != COLUMNS {
            return Err(CsvError::ColumnCount {
                line: line_no,
                found: cells.len(),
            });
        }
        let mut values = [0.0; COLUMNS];
        for (slot, cell) in values.iter_mut().zip(&cells) {
            *slot = cell.trim().parse::<f64>().map_err(|_| CsvError::NotANumber {
                line: line_no,
                value: cell.to_string(),
            })?;
        }
        let [deferral, traditional, roth, brokerage, employer_match, fv, tax] = values;
        out.push(AllocationCandidate {
            employee_deferral_total: deferral,
            traditional_portion: traditional,
            roth_portion: roth,
            brokerage_portion: brokerage,
            employer_match,
            after_tax_future_value: fv,
            current_year_tax: tax,
        });
    }
    Ok(out)
}
