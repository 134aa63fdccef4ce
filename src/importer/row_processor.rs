// ==========================================
// BOQ 导入引擎 - 行处理器实现
// ==========================================
// 职责: 原始行 + 冻结映射 → ParsedBoqItem + 行级问题
// 红线: 行级失败只记录,不向上抛出; 超长文本不截断
// ==========================================

use crate::domain::boq::{format_number, BoqField, ParsedBoqItem, RawRow};
use crate::domain::issue::{ImportIssue, RowIssues};
use crate::domain::mapping::DetectedMapping;
use crate::importer::data_cleaner::{DataCleaner, NumericCell};
use crate::importer::schema_validator::field_max_length;
use serde_json::json;

/// 行处理结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowOutcome {
    pub record: Option<ParsedBoqItem>,
    pub issues: RowIssues,
}

pub struct RowProcessor {
    cleaner: DataCleaner,
    strict: bool, // 严格模式: 可选数值/行号无法解析时报错
}

impl RowProcessor {
    pub fn new(strict: bool) -> Self {
        Self {
            cleaner: DataCleaner,
            strict,
        }
    }

    /// 处理单行
    ///
    /// # 参数
    /// - row: 原始行
    /// - row_number: 数据行号（1 起,与分块方式无关）
    /// - mapping: 冻结后的列映射
    ///
    /// # 返回
    /// - record 为 None 表示必填字段缺失/无法解析,错误已写入 issues
    pub fn process_row(&self, row: &RawRow, row_number: usize, mapping: &DetectedMapping) -> RowOutcome {
        let mut issues = RowIssues::default();

        let (line_number, line_number_defaulted) =
            self.read_line_number(row, row_number, mapping, &mut issues);
        let item_code = self.read_text(row, row_number, mapping, BoqField::ItemCode, &mut issues);
        let description = self.read_text(row, row_number, mapping, BoqField::Description, &mut issues);
        let category = self.read_text(row, row_number, mapping, BoqField::Category, &mut issues);
        let subcategory = self.read_text(row, row_number, mapping, BoqField::Subcategory, &mut issues);
        let quantity = self.read_number(row, row_number, mapping, BoqField::Quantity, &mut issues);
        let uom = self.read_text(row, row_number, mapping, BoqField::Uom, &mut issues);
        let unit_price = self.read_number(row, row_number, mapping, BoqField::UnitPrice, &mut issues);
        let total_price = self.read_number(row, row_number, mapping, BoqField::TotalPrice, &mut issues);
        let phase = self.read_text(row, row_number, mapping, BoqField::Phase, &mut issues);
        let task = self.read_text(row, row_number, mapping, BoqField::Task, &mut issues);
        let site = self.read_text(row, row_number, mapping, BoqField::Site, &mut issues);
        let vendor = self.read_text(row, row_number, mapping, BoqField::Vendor, &mut issues);
        let remarks = self.read_text(row, row_number, mapping, BoqField::Remarks, &mut issues);

        let record = match (description, quantity, uom) {
            (Some(description), Some(quantity), Some(uom)) => Some(ParsedBoqItem {
                row_number,
                line_number,
                line_number_defaulted,
                item_code,
                description,
                category,
                subcategory,
                quantity,
                uom,
                unit_price,
                total_price,
                phase,
                task,
                site,
                vendor,
                remarks,
                raw_data: row.to_pairs(),
            }),
            _ => None,
        };

        RowOutcome { record, issues }
    }

    /// 行号: 缺省/无法解析时使用 row_number,取整
    ///
    /// # 返回
    /// - (行号, 是否由 row_number 补齐)
    fn read_line_number(
        &self,
        row: &RawRow,
        row_number: usize,
        mapping: &DetectedMapping,
        issues: &mut RowIssues,
    ) -> (i64, bool) {
        let column = BoqField::LineNumber.display_name();
        let cell = mapping
            .header_for(BoqField::LineNumber)
            .and_then(|h| row.get(h));

        match self.cleaner.cell_to_number(cell) {
            NumericCell::Value(v) => (v.round() as i64, false),
            NumericCell::FromBool(v) => {
                issues.warn(bool_warning(row_number, column, v));
                (v as i64, false)
            }
            NumericCell::Empty => (row_number as i64, true),
            NumericCell::Invalid(raw) => {
                if self.strict {
                    issues.error(invalid_number(row_number, column, &raw));
                }
                (row_number as i64, true)
            }
        }
    }

    fn read_number(
        &self,
        row: &RawRow,
        row_number: usize,
        mapping: &DetectedMapping,
        field: BoqField,
        issues: &mut RowIssues,
    ) -> Option<f64> {
        let column = field.display_name();
        let cell = mapping.header_for(field).and_then(|h| row.get(h));

        match self.cleaner.cell_to_number(cell) {
            NumericCell::Value(v) => Some(v),
            NumericCell::FromBool(v) => {
                issues.warn(bool_warning(row_number, column, v));
                Some(v)
            }
            NumericCell::Empty => {
                if field.is_required() {
                    issues.error(required(row_number, column));
                }
                None
            }
            NumericCell::Invalid(raw) => {
                if field.is_required() || self.strict {
                    issues.error(invalid_number(row_number, column, &raw));
                }
                None
            }
        }
    }

    fn read_text(
        &self,
        row: &RawRow,
        row_number: usize,
        mapping: &DetectedMapping,
        field: BoqField,
        issues: &mut RowIssues,
    ) -> Option<String> {
        let column = field.display_name();
        let cell = mapping.header_for(field).and_then(|h| row.get(h));

        let Some(value) = self.cleaner.cell_to_text(cell) else {
            if field.is_required() {
                issues.error(required(row_number, column));
            }
            return None;
        };

        if let Some(max) = field_max_length(field) {
            let length = value.chars().count();
            if length > max {
                issues.error(
                    ImportIssue::validation(
                        row_number,
                        column,
                        format!("{} exceeds maximum length of {} characters", column, max),
                    )
                    .with_details(json!({ "length": length, "max_length": max })),
                );
                return None;
            }
        }

        Some(value)
    }
}

fn required(row: usize, column: &str) -> ImportIssue {
    ImportIssue::validation(row, column, format!("{} is required", column))
}

fn invalid_number(row: usize, column: &str, raw: &str) -> ImportIssue {
    ImportIssue::validation(row, column, format!("Invalid number for {}: '{}'", column, raw))
        .with_details(json!({ "raw": raw }))
}

fn bool_warning(row: usize, column: &str, value: f64) -> ImportIssue {
    ImportIssue::validation(
        row,
        column,
        format!("Boolean value converted to {} for {}", format_number(value), column),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::boq::CellValue;
    use crate::importer::column_mapper::{detect_mapping, AliasCatalog};

    fn row(cells: &[(&str, CellValue)]) -> RawRow {
        RawRow::new(
            cells
                .iter()
                .map(|(h, v)| (h.to_string(), v.clone()))
                .collect(),
        )
    }

    fn text(v: &str) -> CellValue {
        CellValue::from_text(v)
    }

    fn mapping_for(r: &RawRow) -> DetectedMapping {
        let headers: Vec<String> = r.headers().map(str::to_string).collect();
        detect_mapping(&headers, &AliasCatalog::default())
    }

    #[test]
    fn test_formatted_numbers_parse_cleanly() {
        let r = row(&[
            ("Description", text("Fibre cable 24F")),
            ("Qty", text("1,250")),
            ("Unit", text("m")),
            ("Rate", text("$45.00")),
            ("Amount", text("56250")),
        ]);
        let outcome = RowProcessor::new(false).process_row(&r, 1, &mapping_for(&r));

        let record = outcome.record.unwrap();
        assert_eq!(record.quantity, 1250.0);
        assert_eq!(record.unit_price, Some(45.0));
        assert_eq!(record.total_price, Some(56250.0));
        assert_eq!(record.line_number, 1);
        assert!(outcome.issues.errors.is_empty());
        assert!(outcome.issues.warnings.is_empty());
    }

    #[test]
    fn test_missing_required_fields() {
        let r = row(&[("Description", text("")), ("Qty", text("abc")), ("Unit", text("m"))]);
        let outcome = RowProcessor::new(false).process_row(&r, 4, &mapping_for(&r));

        assert!(outcome.record.is_none());
        let columns: Vec<_> = outcome.issues.errors.iter().filter_map(|e| e.column()).collect();
        assert_eq!(columns, vec!["description", "quantity"]);
        assert!(outcome.issues.errors.iter().all(|e| e.row() == 4));
    }

    #[test]
    fn test_invalid_optional_number_dropped_unless_strict() {
        let r = row(&[
            ("Description", text("Splice tray")),
            ("Qty", CellValue::Number(2.0)),
            ("UOM", text("ea")),
            ("Rate", text("TBC")),
        ]);
        let mapping = mapping_for(&r);

        let lenient = RowProcessor::new(false).process_row(&r, 1, &mapping);
        assert_eq!(lenient.record.unwrap().unit_price, None);
        assert!(lenient.issues.errors.is_empty());

        let strict = RowProcessor::new(true).process_row(&r, 1, &mapping);
        assert_eq!(strict.issues.errors.len(), 1);
        assert_eq!(strict.issues.errors[0].column(), Some("unitPrice"));
    }

    #[test]
    fn test_line_number_fallback_and_rounding() {
        let r = row(&[
            ("Line", text("n/a")),
            ("Description", text("Manhole cover")),
            ("Qty", text("1")),
            ("UOM", text("ea")),
        ]);
        let mapping = mapping_for(&r);
        let outcome = RowProcessor::new(false).process_row(&r, 7, &mapping);
        let record = outcome.record.unwrap();
        assert_eq!(record.line_number, 7);
        assert!(record.line_number_defaulted);

        let strict = RowProcessor::new(true).process_row(&r, 7, &mapping);
        assert_eq!(strict.issues.errors.len(), 1);

        let r = row(&[
            ("Line", CellValue::Number(3.6)),
            ("Description", text("Manhole cover")),
            ("Qty", text("1")),
            ("UOM", text("ea")),
        ]);
        let outcome = RowProcessor::new(false).process_row(&r, 7, &mapping_for(&r));
        let record = outcome.record.unwrap();
        assert_eq!(record.line_number, 4);
        assert!(!record.line_number_defaulted);
    }

    #[test]
    fn test_bool_quantity_warns() {
        let r = row(&[
            ("Description", text("Site survey")),
            ("Qty", CellValue::Bool(true)),
            ("UOM", text("lot")),
        ]);
        let outcome = RowProcessor::new(false).process_row(&r, 1, &mapping_for(&r));
        assert_eq!(outcome.record.unwrap().quantity, 1.0);
        assert_eq!(outcome.issues.warnings.len(), 1);
    }

    #[test]
    fn test_overlong_text_is_error_not_truncated() {
        let r = row(&[
            ("Description", text("Duct")),
            ("Qty", text("1")),
            ("UOM", text("a very long unit of measure name")),
        ]);
        let outcome = RowProcessor::new(false).process_row(&r, 2, &mapping_for(&r));
        assert!(outcome.record.is_none());
        assert_eq!(outcome.issues.errors.len(), 1);
        assert!(outcome.issues.errors[0].message().contains("maximum length of 20"));
    }

    #[test]
    fn test_raw_data_retained_in_order() {
        let r = row(&[
            ("Description", text("Pole 9m")),
            ("Qty", CellValue::Number(3.0)),
            ("UOM", text("ea")),
            ("Colour", text("green")),
        ]);
        let record = RowProcessor::new(false)
            .process_row(&r, 1, &mapping_for(&r))
            .record
            .unwrap();
        assert_eq!(record.raw_data[1], ("Qty".to_string(), "3".to_string()));
        assert_eq!(record.raw_data[3], ("Colour".to_string(), "green".to_string()));
    }
}
