// ==========================================
// BOQ 导入引擎 - 模式校验器（校验第一层）
// ==========================================
// 职责: 声明式字段约束（必填 / 最大长度 / 数值范围）
// 红线: 违规一律为错误; 负价格由业务层报告,此处不重复
// ==========================================

use crate::config::RuleThresholds;
use crate::domain::boq::{format_number, BoqField, ParsedBoqItem};
use crate::domain::issue::{ImportIssue, RowIssues};
use crate::importer::boq_importer_trait::RowValidator;
use serde_json::json;

/// 字段约束
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConstraint {
    pub field: BoqField,
    pub required: bool,
    pub max_length: Option<usize>,
    pub min: Option<f64>,
    pub min_exclusive: bool,
    pub max: Option<f64>,
}

impl FieldConstraint {
    fn text(field: BoqField, required: bool, max_length: usize) -> Self {
        Self {
            field,
            required,
            max_length: Some(max_length),
            min: None,
            min_exclusive: false,
            max: None,
        }
    }

    fn number(field: BoqField, required: bool, min: Option<f64>, min_exclusive: bool, max: f64) -> Self {
        Self {
            field,
            required,
            max_length: None,
            min,
            min_exclusive,
            max: Some(max),
        }
    }
}

/// 文本字段最大长度（字符数）
pub fn field_max_length(field: BoqField) -> Option<usize> {
    match field {
        BoqField::ItemCode => Some(100),
        BoqField::Description => Some(500),
        BoqField::Category | BoqField::Subcategory => Some(100),
        BoqField::Uom => Some(20),
        BoqField::Phase | BoqField::Task | BoqField::Site => Some(100),
        BoqField::Vendor => Some(100),
        BoqField::Remarks => Some(1000),
        BoqField::LineNumber
        | BoqField::Quantity
        | BoqField::UnitPrice
        | BoqField::TotalPrice => None,
    }
}

pub struct SchemaValidator {
    constraints: Vec<FieldConstraint>,
}

impl SchemaValidator {
    pub fn new(thresholds: &RuleThresholds) -> Self {
        let mut constraints: Vec<FieldConstraint> = BoqField::ALL
            .iter()
            .filter_map(|f| field_max_length(*f).map(|len| FieldConstraint::text(*f, f.is_required(), len)))
            .collect();

        constraints.push(FieldConstraint::number(
            BoqField::Quantity,
            true,
            Some(0.0),
            true,
            thresholds.max_quantity,
        ));
        // 价格下限 0 由业务层的负价硬规则负责
        constraints.push(FieldConstraint::number(
            BoqField::UnitPrice,
            false,
            None,
            false,
            thresholds.max_price,
        ));
        constraints.push(FieldConstraint::number(
            BoqField::TotalPrice,
            false,
            None,
            false,
            thresholds.max_price,
        ));

        Self { constraints }
    }

    pub fn constraints(&self) -> &[FieldConstraint] {
        &self.constraints
    }

    pub fn constraint(&self, field: BoqField) -> Option<&FieldConstraint> {
        self.constraints.iter().find(|c| c.field == field)
    }

    fn check_text(&self, c: &FieldConstraint, item: &ParsedBoqItem, issues: &mut RowIssues) {
        let column = c.field.display_name();
        match item.text(c.field) {
            None | Some("") if c.required => {
                issues.error(ImportIssue::validation(
                    item.row_number,
                    column,
                    format!("{} is required", column),
                ));
            }
            Some(value) => {
                if let Some(max) = c.max_length {
                    let length = value.chars().count();
                    if length > max {
                        issues.error(
                            ImportIssue::validation(
                                item.row_number,
                                column,
                                format!("{} exceeds maximum length of {} characters", column, max),
                            )
                            .with_details(json!({ "length": length, "max_length": max })),
                        );
                    }
                }
            }
            None => {}
        }
    }

    fn check_number(&self, c: &FieldConstraint, item: &ParsedBoqItem, issues: &mut RowIssues) {
        let column = c.field.display_name();
        let Some(value) = item.number(c.field) else {
            if c.required {
                issues.error(ImportIssue::validation(
                    item.row_number,
                    column,
                    format!("{} is required", column),
                ));
            }
            return;
        };

        if let Some(min) = c.min {
            let below = if c.min_exclusive { value <= min } else { value < min };
            if below {
                let relation = if c.min_exclusive { "greater than" } else { "at least" };
                issues.error(
                    ImportIssue::validation(
                        item.row_number,
                        column,
                        format!("{} must be {} {}", column, relation, format_number(min)),
                    )
                    .with_details(json!({ "value": value, "min": min })),
                );
            }
        }

        if let Some(max) = c.max {
            if value > max {
                issues.error(
                    ImportIssue::validation(
                        item.row_number,
                        column,
                        format!("{} must not exceed {}", column, format_number(max)),
                    )
                    .with_details(json!({ "value": value, "max": max })),
                );
            }
        }
    }
}

impl RowValidator for SchemaValidator {
    fn name(&self) -> &'static str {
        "schema"
    }

    fn validate(&self, item: &ParsedBoqItem, issues: &mut RowIssues) {
        for c in &self.constraints {
            if ParsedBoqItem::is_numeric_field(c.field) {
                self.check_number(c, item, issues);
            } else {
                self.check_text(c, item, issues);
            }
        }
    }
}
