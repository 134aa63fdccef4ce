// ==========================================
// BOQ 导入引擎 - 业务规则校验器（校验第二层）
// ==========================================
// 职责: 价格/数量一致性与合理性判断
// 规则: 负价格为错误（硬规则）; 其余均为警告（行保留）
// ==========================================

use crate::config::RuleThresholds;
use crate::domain::boq::{format_number, ParsedBoqItem};
use crate::domain::issue::{ImportIssue, RowIssues};
use crate::importer::boq_importer_trait::RowValidator;
use serde_json::json;

pub struct BusinessValidator {
    thresholds: RuleThresholds,
    create_new_items: bool, // 新建物料时不要求编码
}

impl BusinessValidator {
    pub fn new(thresholds: RuleThresholds, create_new_items: bool) -> Self {
        Self {
            thresholds,
            create_new_items,
        }
    }

    fn check_negative_prices(&self, item: &ParsedBoqItem, issues: &mut RowIssues) {
        if let Some(price) = item.unit_price.filter(|p| *p < 0.0) {
            issues.error(
                ImportIssue::validation(item.row_number, "unitPrice", "Unit price cannot be negative")
                    .with_details(json!({ "value": price })),
            );
        }
        if let Some(price) = item.total_price.filter(|p| *p < 0.0) {
            issues.error(
                ImportIssue::validation(item.row_number, "totalPrice", "Total price cannot be negative")
                    .with_details(json!({ "value": price })),
            );
        }
    }

    /// 单价 × 数量 与合价比对（相对较大值的容差）
    fn check_price_consistency(&self, item: &ParsedBoqItem, issues: &mut RowIssues) {
        let (Some(unit), Some(total)) = (item.unit_price, item.total_price) else {
            return;
        };
        if unit < 0.0 || total < 0.0 {
            return;
        }

        let expected = unit * item.quantity;
        let larger = expected.abs().max(total.abs());
        if larger == 0.0 {
            return;
        }

        let difference = (expected - total).abs();
        if difference > self.thresholds.price_tolerance * larger {
            let suggested = (expected * 100.0).round() / 100.0;
            issues.warn(
                ImportIssue::validation(
                    item.row_number,
                    "totalPrice",
                    format!(
                        "Total price {} does not match unit price × quantity ({}); suggested total {}",
                        format_number(total),
                        format_number(expected),
                        format_number(suggested)
                    ),
                )
                .with_details(json!({
                    "expected_total": expected,
                    "actual_total": total,
                    "suggested_total": suggested,
                })),
            );
        }
    }

    fn check_reasonableness(&self, item: &ParsedBoqItem, issues: &mut RowIssues) {
        let description_length = item.description.trim().chars().count();
        if description_length > 0 && description_length < self.thresholds.min_description_length {
            issues.warn(ImportIssue::validation(
                item.row_number,
                "description",
                format!(
                    "Description is very short ({} characters); consider a more descriptive entry",
                    description_length
                ),
            ));
        }

        if item.quantity > self.thresholds.high_quantity_threshold {
            issues.warn(ImportIssue::validation(
                item.row_number,
                "quantity",
                format!(
                    "Quantity {} is unusually large; please verify",
                    format_number(item.quantity)
                ),
            ));
        }

        if let Some(price) = item
            .unit_price
            .filter(|p| *p > self.thresholds.high_unit_price_threshold)
        {
            issues.warn(ImportIssue::validation(
                item.row_number,
                "unitPrice",
                format!("Unit price {} is unusually high; please verify", format_number(price)),
            ));
        }
    }

    /// 指定类别建议填写物料编码
    fn check_item_code_recommended(&self, item: &ParsedBoqItem, issues: &mut RowIssues) {
        if self.create_new_items || item.item_code.is_some() {
            return;
        }
        let Some(category) = item.category.as_deref() else {
            return;
        };

        let lowered = category.to_lowercase();
        if let Some(keyword) = self
            .thresholds
            .code_required_keywords
            .iter()
            .find(|k| lowered.contains(k.as_str()))
        {
            issues.warn(
                ImportIssue::validation(
                    item.row_number,
                    "itemCode",
                    format!("Item code is recommended for category '{}'", category),
                )
                .with_details(json!({ "category": category, "keyword": keyword })),
            );
        }
    }
}

impl RowValidator for BusinessValidator {
    fn name(&self) -> &'static str {
        "business"
    }

    fn validate(&self, item: &ParsedBoqItem, issues: &mut RowIssues) {
        self.check_negative_prices(item, issues);
        self.check_price_consistency(item, issues);
        self.check_reasonableness(item, issues);
        self.check_item_code_recommended(item, issues);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: f64, unit_price: Option<f64>, total_price: Option<f64>) -> ParsedBoqItem {
        ParsedBoqItem {
            row_number: 3,
            line_number: 3,
            line_number_defaulted: false,
            item_code: None,
            description: "Splice closure 48F".to_string(),
            category: None,
            subcategory: None,
            quantity,
            uom: "ea".to_string(),
            unit_price,
            total_price,
            phase: None,
            task: None,
            site: None,
            vendor: None,
            remarks: None,
            raw_data: Vec::new(),
        }
    }

    fn validate(item: &ParsedBoqItem, create_new_items: bool) -> RowIssues {
        let validator = BusinessValidator::new(RuleThresholds::default(), create_new_items);
        let mut issues = RowIssues::default();
        validator.validate(item, &mut issues);
        issues
    }

    #[test]
    fn test_matching_prices_no_warning() {
        let issues = validate(&item(1250.0, Some(45.0), Some(56250.0)), false);
        assert!(issues.errors.is_empty());
        assert!(issues.warnings.is_empty());
    }

    #[test]
    fn test_within_tolerance_no_warning() {
        // 0.5% 偏差
        let issues = validate(&item(10.0, Some(10.0), Some(100.5)), false);
        assert!(issues.warnings.is_empty());
    }

    #[test]
    fn test_price_mismatch_warning_with_suggestion() {
        let issues = validate(&item(10.0, Some(12.5), Some(150.0)), false);
        assert!(issues.errors.is_empty());
        assert_eq!(issues.warnings.len(), 1);

        let details = issues.warnings[0].details().unwrap();
        assert_eq!(details["expected_total"], json!(125.0));
        assert_eq!(details["actual_total"], json!(150.0));
        assert_eq!(details["suggested_total"], json!(125.0));
        assert_eq!(issues.warnings[0].column(), Some("totalPrice"));
    }

    #[test]
    fn test_negative_price_is_error() {
        let issues = validate(&item(2.0, Some(-10.0), Some(-20.0)), false);
        assert_eq!(issues.errors.len(), 2);
        // 负价格不再做一致性比对
        assert!(issues.warnings.is_empty());
    }

    #[test]
    fn test_reasonableness_warnings() {
        let mut it = item(20_000.0, Some(2_000_000.0), None);
        it.description = "Pole".to_string();
        let issues = validate(&it, false);

        let columns: Vec<_> = issues.warnings.iter().filter_map(|w| w.column()).collect();
        assert_eq!(columns, vec!["description", "quantity", "unitPrice"]);
        assert!(issues.errors.is_empty());
    }

    #[test]
    fn test_item_code_recommended_for_cable_category() {
        let mut it = item(5.0, None, None);
        it.category = Some("Fibre Cable".to_string());

        let issues = validate(&it, false);
        assert_eq!(issues.warnings.len(), 1);
        assert_eq!(issues.warnings[0].column(), Some("itemCode"));

        // 允许新建物料时不提示
        assert!(validate(&it, true).warnings.is_empty());

        it.item_code = Some("FC-24".to_string());
        assert!(validate(&it, false).warnings.is_empty());
    }
}
