use analysis_core::{
    CorrelationMatrix, DataTable, ExportTable, ExportTables, PriceTable, DATE_FORMAT,
};
use chrono::NaiveDate;

fn date_index(dates: &[NaiveDate]) -> Vec<String> {
    dates.iter().map(|d| d.format(DATE_FORMAT).to_string()).collect()
}

/// Transpose symbol-major columns into date-indexed rows.
fn transpose<T: Copy>(
    columns: &[Vec<T>],
    rows: usize,
    cell: impl Fn(T) -> Option<f64>,
) -> Vec<Vec<Option<f64>>> {
    (0..rows)
        .map(|row| columns.iter().map(|c| cell(c[row])).collect())
        .collect()
}

pub fn price_table_export(raw: &PriceTable) -> ExportTable {
    ExportTable {
        index_label: "Date".to_string(),
        index: date_index(raw.dates()),
        columns: raw.symbols().to_vec(),
        rows: transpose(raw.columns(), raw.len(), |v| v),
    }
}

pub fn data_table_export(table: &DataTable) -> ExportTable {
    ExportTable {
        index_label: "Date".to_string(),
        index: date_index(&table.dates),
        columns: table.symbols.clone(),
        rows: transpose(&table.columns, table.len(), Some),
    }
}

pub fn correlation_export(matrix: &CorrelationMatrix) -> ExportTable {
    ExportTable {
        index_label: "Symbol".to_string(),
        index: matrix.symbols.clone(),
        columns: matrix.symbols.clone(),
        rows: matrix.values.clone(),
    }
}

/// Project the processor's tables into the flat export shape.
///
/// `daily_pct` and `cumulative_pct` are expected in percentage units; the
/// correlation matrix is computed on decimal returns by the caller.
pub fn export_tables(
    raw: &PriceTable,
    daily_pct: &DataTable,
    cumulative_pct: &DataTable,
    correlation: &CorrelationMatrix,
) -> ExportTables {
    ExportTables {
        price_data: price_table_export(raw),
        daily_returns: data_table_export(daily_pct),
        cumulative_returns: data_table_export(cumulative_pct),
        correlation_matrix: correlation_export(correlation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_export_keeps_missing_cells() {
        let d0 = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let raw = PriceTable::new(
            vec![d0, d0.succ_opt().unwrap()],
            vec!["A".into(), "B".into()],
            vec![vec![Some(10.0), Some(11.0)], vec![None, Some(20.0)]],
        )
        .unwrap();
        let table = price_table_export(&raw);
        assert_eq!(table.index, vec!["2024-02-01", "2024-02-02"]);
        assert_eq!(table.columns, vec!["A", "B"]);
        assert_eq!(table.rows[0], vec![Some(10.0), None]);
        assert_eq!(table.cell("2024-02-02", "B"), Some(20.0));
    }
}
