//! CSV生成

use super::EXPORT_COLUMNS;
use crate::error::{Error, Result};
use crate::types::LedgerEntry;

/// ヘッダ行 + 1エントリ1行のCSVをバッファに生成
pub fn generate_csv_buffer<'a, I>(entries: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_COLUMNS.iter().map(|c| c.header()))?;

    for entry in entries {
        writer.write_record(EXPORT_COLUMNS.iter().map(|c| c.value(entry)))?;
    }

    writer
        .into_inner()
        .map_err(|e| Error::Export(format!("CSV書き出しエラー: {}", e)))
}
