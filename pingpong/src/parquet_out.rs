use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::aggregate::MeasurementMatrix;
use crate::error::Result;
use crate::topology::ProcessIdentity;

/// One off-diagonal matrix cell in long form.
pub struct CellRow {
    pub pass: String,
    pub rank: u32,
    pub peer: u32,
    pub node: i64,
    pub peer_node: i64,
    pub seconds_per_byte: f64,
}

/// Long-form rows for every benchmarked (non-zero, off-diagonal) cell.
pub fn rows_from_matrix(
    pass: &str,
    matrix: &MeasurementMatrix,
    identities: &[ProcessIdentity],
) -> Vec<CellRow> {
    let size = matrix.size().min(identities.len());
    let mut rows = Vec::new();
    for i in 0..size {
        for j in 0..size {
            let v = matrix.get(i, j);
            if i == j || v == 0.0 {
                continue;
            }
            rows.push(CellRow {
                pass: pass.to_string(),
                rank: i as u32,
                peer: j as u32,
                node: identities[i].node_id,
                peer_node: identities[j].node_id,
                seconds_per_byte: v,
            });
        }
    }
    rows
}

pub fn write_parquet(path: &Path, rows: &[CellRow]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("pass", DataType::Utf8, false),
        Field::new("rank", DataType::UInt32, false),
        Field::new("peer", DataType::UInt32, false),
        Field::new("node", DataType::Int64, false),
        Field::new("peer_node", DataType::Int64, false),
        Field::new("seconds_per_byte", DataType::Float64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.pass.as_str()).collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(UInt32Array::from(
                rows.iter().map(|r| r.rank).collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(UInt32Array::from(
                rows.iter().map(|r| r.peer).collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(Int64Array::from(
                rows.iter().map(|r| r.node).collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(Int64Array::from(
                rows.iter().map(|r| r.peer_node).collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(Float64Array::from(
                rows.iter().map(|r| r.seconds_per_byte).collect::<Vec<_>>(),
            )) as ArrayRef,
        ],
    )?;

    let file = std::fs::File::create(path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}
