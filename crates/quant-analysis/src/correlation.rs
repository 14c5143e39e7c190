use analysis_core::{stats, CorrelationMatrix, DataTable};

fn has_variance(column: &[f64]) -> bool {
    match column.first() {
        Some(&first) if column.len() >= 2 => column.iter().any(|&v| v != first),
        _ => false,
    }
}

/// Pearson correlation between every pair of columns.
///
/// The diagonal is exactly 1 for a column that moves at all; any pair that
/// involves a constant column is undefined.
pub fn correlation_matrix(returns: &DataTable) -> CorrelationMatrix {
    let n = returns.symbols.len();
    let moving: Vec<bool> = returns.columns.iter().map(|c| has_variance(c)).collect();
    let mut values = vec![vec![None; n]; n];

    for i in 0..n {
        if !moving[i] {
            continue;
        }
        values[i][i] = Some(1.0);
        for j in (i + 1)..n {
            if !moving[j] {
                continue;
            }
            let rho = stats::pearson(&returns.columns[i], &returns.columns[j]);
            values[i][j] = rho;
            values[j][i] = rho;
        }
    }

    CorrelationMatrix {
        symbols: returns.symbols.clone(),
        values,
    }
}
