// ==========================================
// BOQ 导入引擎 - 一致性校验器（校验第三层）
// ==========================================
// 职责: 全数据集交叉校验,所有行处理完成后执行一次
// 规则: 行号重复 → 错误（后出现的行被剔除）
//       物料编码重复 → 警告
//       同类别计量单位过多 → 警告（row 0）
//       单价离群（> N × 类别均价）→ 警告
// ==========================================

use crate::config::RuleThresholds;
use crate::domain::boq::{format_number, ParsedBoqItem};
use crate::domain::issue::ImportIssue;
use crate::importer::boq_importer_trait::{ConsistencyChecker, ConsistencyReport};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};

pub struct ConsistencyValidator {
    max_uoms_per_category: usize,
    price_outlier_factor: f64,
}

impl ConsistencyValidator {
    pub fn new(thresholds: &RuleThresholds) -> Self {
        Self {
            max_uoms_per_category: thresholds.max_uoms_per_category,
            price_outlier_factor: thresholds.price_outlier_factor,
        }
    }

    fn check_line_numbers(&self, items: &[&ParsedBoqItem], report: &mut ConsistencyReport) {
        let mut first_seen: HashMap<i64, usize> = HashMap::new();
        // 补齐的行号不是文件中的值,不参与比较
        for item in items.iter().filter(|i| !i.line_number_defaulted) {
            match first_seen.get(&item.line_number) {
                Some(first_row) => {
                    report.issues.error(
                        ImportIssue::validation(
                            item.row_number,
                            "lineNumber",
                            format!(
                                "Duplicate line number {} (rows {} and {})",
                                item.line_number, first_row, item.row_number
                            ),
                        )
                        .with_details(json!({
                            "line_number": item.line_number,
                            "first_row": first_row,
                            "duplicate_row": item.row_number,
                        })),
                    );
                    report.rejected_rows.insert(item.row_number);
                }
                None => {
                    first_seen.insert(item.line_number, item.row_number);
                }
            }
        }
    }

    fn check_item_codes(&self, items: &[&ParsedBoqItem], report: &mut ConsistencyReport) {
        let mut first_seen: HashMap<String, usize> = HashMap::new();
        for item in items {
            let Some(code) = item.item_code.as_deref() else {
                continue;
            };
            let key = code.trim().to_lowercase();
            match first_seen.get(&key) {
                Some(first_row) => report.issues.warn(
                    ImportIssue::validation(
                        item.row_number,
                        "itemCode",
                        format!("Item code '{}' also appears on row {}", code, first_row),
                    )
                    .with_details(json!({
                        "item_code": code,
                        "first_row": first_row,
                        "duplicate_row": item.row_number,
                    })),
                ),
                None => {
                    first_seen.insert(key, item.row_number);
                }
            }
        }
    }

    /// 按类别分组（忽略大小写,保持首次出现顺序）
    fn group_by_category<'a>(items: &[&'a ParsedBoqItem]) -> Vec<(String, Vec<&'a ParsedBoqItem>)> {
        let mut order: Vec<(String, Vec<&ParsedBoqItem>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for item in items {
            let Some(category) = item.category.as_deref() else {
                continue;
            };
            let key = category.trim().to_lowercase();
            match index.get(&key) {
                Some(&i) => order[i].1.push(*item),
                None => {
                    index.insert(key, order.len());
                    order.push((category.to_string(), vec![*item]));
                }
            }
        }
        order
    }

    fn check_category_uoms(
        &self,
        groups: &[(String, Vec<&ParsedBoqItem>)],
        report: &mut ConsistencyReport,
    ) {
        for (category, members) in groups {
            let uoms: BTreeSet<String> = members
                .iter()
                .map(|i| i.uom.trim().to_lowercase())
                .collect();
            if uoms.len() > self.max_uoms_per_category {
                report.issues.warn(
                    ImportIssue::validation(
                        0,
                        "uom",
                        format!(
                            "Category '{}' uses {} different units of measure",
                            category,
                            uoms.len()
                        ),
                    )
                    .with_details(json!({ "category": category, "uoms": uoms })),
                );
            }
        }
    }

    fn check_price_outliers(
        &self,
        groups: &[(String, Vec<&ParsedBoqItem>)],
        report: &mut ConsistencyReport,
    ) {
        for (category, members) in groups {
            let priced: Vec<(&ParsedBoqItem, f64)> = members
                .iter()
                .filter_map(|i| i.unit_price.map(|p| (*i, p)))
                .collect();
            if priced.len() < 2 {
                continue;
            }

            let average = priced.iter().map(|(_, p)| p).sum::<f64>() / priced.len() as f64;
            if average <= 0.0 {
                continue;
            }

            for (item, price) in &priced {
                if *price > self.price_outlier_factor * average {
                    report.issues.warn(
                        ImportIssue::validation(
                            item.row_number,
                            "unitPrice",
                            format!(
                                "Unit price {} is more than {}× the '{}' category average ({:.2})",
                                format_number(*price),
                                format_number(self.price_outlier_factor),
                                category,
                                average
                            ),
                        )
                        .with_details(json!({
                            "unit_price": price,
                            "category": category,
                            "category_average": average,
                        })),
                    );
                }
            }
        }
    }
}

impl ConsistencyChecker for ConsistencyValidator {
    fn check(&self, items: &[ParsedBoqItem]) -> ConsistencyReport {
        let mut ordered: Vec<&ParsedBoqItem> = items.iter().collect();
        ordered.sort_by_key(|i| i.row_number);

        let mut report = ConsistencyReport::default();
        self.check_line_numbers(&ordered, &mut report);

        // 其余检查只针对保留下来的记录
        let retained: Vec<&ParsedBoqItem> = ordered
            .into_iter()
            .filter(|i| !report.rejected_rows.contains(&i.row_number))
            .collect();

        self.check_item_codes(&retained, &mut report);

        let groups = Self::group_by_category(&retained);
        self.check_category_uoms(&groups, &mut report);
        self.check_price_outliers(&groups, &mut report);

        report
    }
}
