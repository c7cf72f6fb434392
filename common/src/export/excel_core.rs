//! Excel生成（共通ライブラリ）
//!
//! エクスポート列の定義を使用して解析履歴の一覧シートを生成

use super::{ExportColumn, EXPORT_COLUMNS};
use crate::types::LedgerEntry;
use rust_xlsxwriter::*;

const SHEET_NAME: &str = "Analises";

/// 列幅（文字数）
fn column_width(column: ExportColumn) -> f64 {
    match column {
        ExportColumn::SampleName => 28.0,
        ExportColumn::Date => 12.0,
        ExportColumn::Time => 10.0,
        _ => 16.0,
    }
}

/// 有限の数値として読める値（NaN/infは文字列のまま）
fn numeric_value(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Excelをバッファに生成
///
/// 数値として解釈できる集計値は数値セル、それ以外は文字列セルで書き込む。
pub fn generate_excel_buffer<'a, I>(entries: I) -> Result<Vec<u8>, String>
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let mut workbook = Workbook::new();

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::RGB(0x555555))
        .set_background_color(Color::RGB(0xF5F5F5))
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Hair)
        .set_border_color(Color::RGB(0xAAAAAA));

    let value_format = Format::new()
        .set_border(FormatBorder::Hair)
        .set_border_color(Color::RGB(0xCCCCCC));

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)
        .map_err(|e| format!("シート名設定エラー: {}", e))?;

    for (col, column) in EXPORT_COLUMNS.iter().enumerate() {
        let col = col as u16;
        worksheet.set_column_width(col, column_width(*column))
            .map_err(|e| format!("列幅設定エラー: {}", e))?;
        worksheet.write_string_with_format(0, col, column.header(), &header_format)
            .map_err(|e| format!("ヘッダ書き込みエラー: {}", e))?;
    }

    for (index, entry) in entries.into_iter().enumerate() {
        let row = index as u32 + 1;
        for (col, column) in EXPORT_COLUMNS.iter().enumerate() {
            let col = col as u16;
            let value = column.value(entry);
            let number = if column.is_numeric() { numeric_value(value) } else { None };

            match number {
                Some(n) => {
                    worksheet.write_number_with_format(row, col, n, &value_format)
                        .map_err(|e| format!("値書き込みエラー: {}", e))?;
                }
                None => {
                    worksheet.write_string_with_format(row, col, value, &value_format)
                        .map_err(|e| format!("値書き込みエラー: {}", e))?;
                }
            }
        }
    }

    // バッファに書き出し
    workbook.save_to_buffer()
        .map_err(|e| format!("Excel保存エラー: {}", e))
}
