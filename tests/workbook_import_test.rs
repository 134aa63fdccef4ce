// ==========================================
// Excel 工作簿导入集成测试
// ==========================================
// 测试目标: 单元格类型保留、工作表选择、工作簿端到端导入
// 测试数据: rust_xlsxwriter 内存生成
// ==========================================


use boq_import_engine::config::ImportConfig;
use boq_import_engine::domain::CellValue;
use boq_import_engine::importer::{
    BoqImporter, EngineError, FileParser, ReadOptions, UniversalFileParser,
};
use chrono::NaiveDate;
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
use test_helpers::*;

/// 两个工作表: "BOQ"（清单, 含数值/布尔/日期列）与 "Notes"
fn boq_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let required_by = ExcelDateTime::from_ymd(2025, 3, 1).unwrap();

    let sheet = workbook.add_worksheet();
    sheet.set_name("BOQ").unwrap();
    let headers = ["Item No", "Item Description", "Qty", "Unit", "Rate", "Delivered", "Required By"];
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    sheet.write_number(1, 0, 1.0).unwrap();
    sheet.write_string(1, 1, "Fibre cable 24F").unwrap();
    sheet.write_number(1, 2, 1250.0).unwrap();
    sheet.write_string(1, 3, "m").unwrap();
    sheet.write_number(1, 4, 45.0).unwrap();
    sheet.write_boolean(1, 5, true).unwrap();
    sheet
        .write_datetime_with_format(1, 6, &required_by, &date_format)
        .unwrap();

    sheet.write_number(2, 0, 2.0).unwrap();
    sheet.write_string(2, 1, "Splice closure 48F").unwrap();
    sheet.write_number(2, 2, 4.0).unwrap();
    sheet.write_string(2, 3, "ea").unwrap();
    sheet.write_number(2, 4, 80.0).unwrap();
    sheet.write_boolean(2, 5, false).unwrap();

    let notes = workbook.add_worksheet();
    notes.set_name("Notes").unwrap();
    notes.write_string(0, 0, "Remarks").unwrap();
    notes.write_string(1, 0, "Prices exclude VAT").unwrap();

    workbook.save_to_buffer().unwrap()
}

#[test]
fn test_first_sheet_keeps_cell_types() {
    let data = UniversalFileParser
        .parse("boq.xlsx", &boq_workbook(), &ReadOptions::default())
        .unwrap();

    assert_eq!(data.sheet_name.as_deref(), Some("BOQ"));
    assert_eq!(data.delimiter, None);
    assert_eq!(data.rows.len(), 2);

    let row = &data.rows[0];
    assert_eq!(row.get("Qty"), Some(&CellValue::Number(1250.0)));
    assert_eq!(
        row.get("Item Description"),
        Some(&CellValue::Text("Fibre cable 24F".to_string()))
    );
    assert_eq!(row.get("Delivered"), Some(&CellValue::Bool(true)));
    let expected = NaiveDate::from_ymd_opt(2025, 3, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    assert_eq!(row.get("Required By"), Some(&CellValue::Date(expected)));

    // 第二行日期列为空
    assert_eq!(data.rows[1].get("Required By"), Some(&CellValue::Empty));
}

#[test]
fn test_named_sheet_is_selected() {
    let options = ReadOptions {
        sheet_name: Some("notes".to_string()),
        ..ReadOptions::default()
    };
    let data = UniversalFileParser
        .parse("boq.xlsx", &boq_workbook(), &options)
        .unwrap();

    assert_eq!(data.sheet_name.as_deref(), Some("Notes"));
    assert_eq!(data.headers, vec!["Remarks"]);
    assert_eq!(data.rows.len(), 1);
}

#[test]
fn test_missing_sheet_is_error() {
    let options = ReadOptions {
        sheet_name: Some("Pricing".to_string()),
        ..ReadOptions::default()
    };
    let result = UniversalFileParser.parse("boq.xlsx", &boq_workbook(), &options);
    assert!(matches!(result, Err(EngineError::SheetNotFound(name)) if name == "Pricing"));
}

#[tokio::test]
async fn test_workbook_import_end_to_end() {
    let result = importer()
        .import_bytes("boq.xlsx", &boq_workbook(), &ImportConfig::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.stats.valid_rows, 2);
    let item = &result.data[0];
    assert_eq!(item.line_number, 1);
    assert!(!item.line_number_defaulted);
    assert_eq!(item.quantity, 1250.0);
    assert_eq!(item.unit_price, Some(45.0));
    assert!(item
        .raw_data
        .contains(&("Required By".to_string(), "2025-03-01".to_string())));

    // 指定不存在的工作表: 数据集级失败
    let config = ImportConfig {
        sheet_name: Some("Pricing".to_string()),
        ..ImportConfig::default()
    };
    let result = importer()
        .import_bytes("boq.xlsx", &boq_workbook(), &config)
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result.errors[0].message().contains("Worksheet not found"));
}
