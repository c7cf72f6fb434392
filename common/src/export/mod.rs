//! 解析履歴のエクスポート
//!
//! CSV/Excelとも同じ固定列を使う。エントリに値がない列は空文字。

pub mod csv_core;

#[cfg(feature = "excel")]
pub mod excel_core;

use crate::types::LedgerEntry;

/// エクスポート列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportColumn {
    SampleName,
    Date,
    Time,
    Total,
    Density,
    EstimatedTotal,
}

/// 列の並び（固定）
pub const EXPORT_COLUMNS: [ExportColumn; 6] = [
    ExportColumn::SampleName,
    ExportColumn::Date,
    ExportColumn::Time,
    ExportColumn::Total,
    ExportColumn::Density,
    ExportColumn::EstimatedTotal,
];

impl ExportColumn {
    /// ヘッダ名（既存の集計シートと互換の名前）
    pub fn header(&self) -> &'static str {
        match self {
            ExportColumn::SampleName => "nomeAmostra",
            ExportColumn::Date => "data",
            ExportColumn::Time => "hora",
            ExportColumn::Total => "TOTAL",
            ExportColumn::Density => "densidadecoloniascm2",
            ExportColumn::EstimatedTotal => "estimativatotalcolonias",
        }
    }

    pub fn value<'a>(&self, entry: &'a LedgerEntry) -> &'a str {
        match self {
            ExportColumn::SampleName => &entry.sample_name,
            ExportColumn::Date => &entry.date_iso,
            ExportColumn::Time => &entry.time_iso,
            ExportColumn::Total => entry.total().unwrap_or(""),
            ExportColumn::Density => entry.density().unwrap_or(""),
            ExportColumn::EstimatedTotal => entry.estimated_total().unwrap_or(""),
        }
    }

    /// 数値として書き出す列
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ExportColumn::Total | ExportColumn::Density | ExportColumn::EstimatedTotal
        )
    }
}
