// ==========================================
// BOQ 导入引擎 - 列映射器实现
// ==========================================
// 职责: 表头 → 规范字段 自动识别 + 置信度评分 + 必填完整性检查
// 评分: 精确 1.0 / 表头包含别名 0.8 / 别名包含表头 0.7 / 词元重叠比例
// 红线: 评分为纯函数; 每个表头至多分配给一个字段
// ==========================================

use crate::domain::boq::BoqField;
use crate::domain::issue::ImportIssue;
use crate::domain::mapping::{DetectedMapping, FieldAssignment};
use crate::importer::boq_importer_trait::ColumnMapper;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};

/// 字段候选表头的最低得分（严格大于）
pub const MATCH_THRESHOLD: f64 = 0.5;

/// 整体置信度低于该值时建议人工复核
pub const MANUAL_REVIEW_THRESHOLD: f64 = 0.3;

/// 必填字段建议表头的最低得分
const SUGGESTION_THRESHOLD: f64 = 0.3;

// ==========================================
// AliasCatalog - 字段别名目录
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct AliasCatalog {
    aliases: BTreeMap<BoqField, Vec<String>>,
}

impl Default for AliasCatalog {
    fn default() -> Self {
        let table: [(BoqField, &[&str]); 14] = [
            (
                BoqField::LineNumber,
                &[
                    "line", "item", "#", "no", "number", "line_number", "item_number", "item no",
                    "line no",
                ],
            ),
            (
                BoqField::ItemCode,
                &[
                    "code", "item_code", "product_code", "part_number", "sku", "item code",
                    "part no",
                ],
            ),
            (
                BoqField::Description,
                &["description", "desc", "item_description", "details", "item description"],
            ),
            (BoqField::Category, &["category", "cat", "type", "group"]),
            (BoqField::Subcategory, &["subcategory", "sub_category", "sub category"]),
            (BoqField::Quantity, &["qty", "quantity", "amount", "count"]),
            (BoqField::Uom, &["uom", "unit", "units", "measure", "unit_of_measure"]),
            (BoqField::UnitPrice, &["unit_price", "price", "cost", "rate"]),
            (
                BoqField::TotalPrice,
                &["total", "total_price", "total_cost", "line_total", "amount"],
            ),
            (BoqField::Phase, &["phase", "stage"]),
            (BoqField::Task, &["task", "activity"]),
            (BoqField::Site, &["site", "location", "area"]),
            (BoqField::Vendor, &["vendor", "supplier"]),
            (BoqField::Remarks, &["remarks", "notes", "comments"]),
        ];

        Self {
            aliases: table
                .iter()
                .map(|(field, list)| (*field, list.iter().map(|a| a.to_string()).collect()))
                .collect(),
        }
    }
}

impl AliasCatalog {
    /// 部分覆写: 仅替换给出字段的别名列表
    pub fn with_overrides(mut self, overrides: &HashMap<BoqField, Vec<String>>) -> Self {
        for (field, aliases) in overrides {
            let cleaned: Vec<String> = aliases
                .iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect();
            if !cleaned.is_empty() {
                self.aliases.insert(*field, cleaned);
            }
        }
        self
    }

    pub fn aliases(&self, field: BoqField) -> &[String] {
        self.aliases.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 表头对字段的最佳得分（取所有别名的最大值）
    pub fn best_score(&self, field: BoqField, header: &str) -> f64 {
        self.aliases(field)
            .iter()
            .map(|alias| score_header(header, alias))
            .fold(0.0, f64::max)
    }
}

// ==========================================
// 评分函数
// ==========================================

/// 统一大小写与分隔符: "Unit_Price" → "unit price"
fn normalize(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(value: &str) -> Vec<&str> {
    value
        .split(|c: char| c.is_whitespace() || matches!(c, '_' | '-' | '.' | '/' | '(' | ')'))
        .filter(|t| !t.is_empty())
        .collect()
}

/// 表头与单个别名的匹配得分（0.0 ~ 1.0）
///
/// 短别名（≤2 字符,如 `#`、`no`）在包含判定中必须作为完整词元出现,
/// 避免 "Nominal" 之类的表头误命中。
pub fn score_header(header: &str, alias: &str) -> f64 {
    let header = normalize(header);
    let alias = normalize(alias);

    if header.is_empty() || alias.is_empty() {
        return 0.0;
    }

    if header == alias {
        return 1.0;
    }

    let header_tokens = tokens(&header);
    let alias_is_short = alias.chars().count() <= 2;

    let header_contains_alias = if alias_is_short {
        header_tokens.iter().any(|t| *t == alias)
    } else {
        header.contains(&alias)
    };
    if header_contains_alias {
        return 0.8;
    }

    if header.chars().count() > 2 && alias.contains(&header) {
        return 0.7;
    }

    // 词元重叠
    let header_words: Vec<&str> = header_tokens
        .into_iter()
        .filter(|t| t.chars().count() > 1)
        .collect();
    let alias_words: Vec<&str> = tokens(&alias)
        .into_iter()
        .filter(|t| t.chars().count() > 1)
        .collect();

    let denominator = header_words.len().max(alias_words.len());
    if denominator == 0 {
        return 0.0;
    }

    let overlaps = alias_words
        .iter()
        .flat_map(|a| header_words.iter().map(move |h| (a, h)))
        .filter(|(a, h)| a.contains(**h) || h.contains(**a))
        .count();

    (overlaps as f64 / denominator as f64).min(1.0)
}

// ==========================================
// 映射检测
// ==========================================

/// 检测映射: 先收集所有 (字段, 表头) 候选,按得分降序贪心分配,
/// 每个字段、每个表头各只分配一次
pub fn detect_mapping(headers: &[String], catalog: &AliasCatalog) -> DetectedMapping {
    let mut candidates: Vec<(f64, usize, usize)> = Vec::new(); // (得分, 字段序, 表头序)
    for (field_idx, field) in BoqField::ALL.iter().enumerate() {
        for (header_idx, header) in headers.iter().enumerate() {
            let score = catalog.best_score(*field, header);
            if score > MATCH_THRESHOLD {
                candidates.push((score, field_idx, header_idx));
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });

    let mut assignments: BTreeMap<BoqField, FieldAssignment> = BTreeMap::new();
    let mut used_headers: HashSet<usize> = HashSet::new();
    for (score, field_idx, header_idx) in candidates {
        let field = BoqField::ALL[field_idx];
        if assignments.contains_key(&field) || used_headers.contains(&header_idx) {
            continue;
        }
        used_headers.insert(header_idx);
        assignments.insert(
            field,
            FieldAssignment {
                field,
                header: headers[header_idx].clone(),
                confidence: score,
            },
        );
    }

    let confidence = if assignments.is_empty() {
        0.0
    } else {
        assignments.values().map(|a| a.confidence).sum::<f64>() / assignments.len() as f64
    };

    let missing_required = BoqField::REQUIRED
        .iter()
        .copied()
        .filter(|f| !assignments.contains_key(f))
        .collect();

    let mut mapping = DetectedMapping {
        assignments,
        confidence,
        unmapped_headers: Vec::new(),
        missing_required,
    };
    mapping.unmapped_headers = unmapped_headers(&mapping, headers);
    mapping
}

/// 未分配给任何字段的表头（保持原顺序）
pub fn unmapped_headers(mapping: &DetectedMapping, headers: &[String]) -> Vec<String> {
    let used: HashSet<&str> = mapping
        .assignments
        .values()
        .map(|a| a.header.as_str())
        .collect();
    headers
        .iter()
        .filter(|h| !used.contains(h.as_str()))
        .cloned()
        .collect()
}

/// 必填字段完整性检查: 缺失字段 + 可能对应的未用表头建议
pub fn check_completeness(
    mapping: &DetectedMapping,
    headers: &[String],
    catalog: &AliasCatalog,
) -> Option<ImportIssue> {
    let missing: Vec<BoqField> = BoqField::REQUIRED
        .iter()
        .copied()
        .filter(|f| !mapping.is_mapped(*f))
        .collect();

    if missing.is_empty() {
        return None;
    }

    let unused = unmapped_headers(mapping, headers);
    let mut suggestions = serde_json::Map::new();
    for field in &missing {
        let best = unused
            .iter()
            .map(|h| (h, catalog.best_score(*field, h)))
            .filter(|(_, score)| *score > SUGGESTION_THRESHOLD)
            .fold(None::<(&String, f64)>, |best, (h, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((h, score)),
            });
        if let Some((header, _)) = best {
            suggestions.insert(field.display_name().to_string(), json!(header));
        }
    }

    let names: Vec<&str> = missing.iter().map(|f| f.display_name()).collect();
    Some(
        ImportIssue::mapping(None, format!("Required fields not mapped: {}", names.join(", ")))
            .with_details(json!({
                "missing": names,
                "suggestions": suggestions,
            })),
    )
}

// ==========================================
// AliasColumnMapper - ColumnMapper Trait 实现
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct AliasColumnMapper {
    catalog: AliasCatalog,
}

impl AliasColumnMapper {
    pub fn new(catalog: AliasCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &AliasCatalog {
        &self.catalog
    }
}

impl ColumnMapper for AliasColumnMapper {
    fn detect(&self, headers: &[String]) -> DetectedMapping {
        detect_mapping(headers, &self.catalog)
    }

    fn check_completeness(&self, mapping: &DetectedMapping, headers: &[String]) -> Option<ImportIssue> {
        check_completeness(mapping, headers, &self.catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_score_tiers() {
        assert_eq!(score_header("Qty", "qty"), 1.0);
        assert_eq!(score_header(" UNIT_PRICE ", "unit price"), 1.0);
        assert_eq!(score_header("Total Qty", "qty"), 0.8);
        assert_eq!(score_header("desc", "description"), 0.7);
        // 词元重叠: "price" 与 "unit price" 共享 1/2
        assert_eq!(score_header("Price Each", "unit_price"), 0.5);
    }

    #[test]
    fn test_short_alias_requires_whole_token() {
        assert_eq!(score_header("Item #", "#"), 0.8);
        assert_eq!(score_header("Ref No", "no"), 0.8);
        assert!(score_header("Nominal Voltage", "no") <= MATCH_THRESHOLD);
    }

    #[test]
    fn test_standard_boq_headers() {
        let h = headers(&["Item No", "Item Description", "Qty", "Unit", "Rate", "Amount"]);
        let mapping = detect_mapping(&h, &AliasCatalog::default());

        assert_eq!(mapping.header_for(BoqField::LineNumber), Some("Item No"));
        assert_eq!(mapping.header_for(BoqField::Description), Some("Item Description"));
        assert_eq!(mapping.header_for(BoqField::Quantity), Some("Qty"));
        assert_eq!(mapping.header_for(BoqField::Uom), Some("Unit"));
        assert_eq!(mapping.header_for(BoqField::UnitPrice), Some("Rate"));
        assert_eq!(mapping.header_for(BoqField::TotalPrice), Some("Amount"));
        assert!(mapping.confidence >= 0.7);
        assert!(mapping.missing_required.is_empty());
        assert!(mapping.unmapped_headers.is_empty());
    }

    #[test]
    fn test_each_header_used_once() {
        let h = headers(&["Description", "Amount", "UOM"]);
        let mapping = detect_mapping(&h, &AliasCatalog::default());

        // "Amount" 同时是数量与合价的别名,只能分配给一个字段
        assert_eq!(mapping.header_for(BoqField::Quantity), Some("Amount"));
        assert_eq!(mapping.header_for(BoqField::TotalPrice), None);
    }

    #[test]
    fn test_detection_is_idempotent() {
        let h = headers(&["Line", "Part No", "Desc", "Quantity", "Units", "Cost", "Location"]);
        let catalog = AliasCatalog::default();
        let first = detect_mapping(&h, &catalog);
        let second = detect_mapping(&h, &catalog);
        assert_eq!(first, second);
        assert_eq!(first.header_for(BoqField::ItemCode), Some("Part No"));
        assert_eq!(first.header_for(BoqField::Site), Some("Location"));
    }

    #[test]
    fn test_no_match_gives_zero_confidence() {
        let h = headers(&["Foo", "Bar"]);
        let mapping = detect_mapping(&h, &AliasCatalog::default());
        assert_eq!(mapping.confidence, 0.0);
        assert_eq!(mapping.unmapped_headers, h);
        assert_eq!(mapping.missing_required.len(), 3);
    }

    #[test]
    fn test_overrides_replace_only_named_fields() {
        let mut overrides = HashMap::new();
        overrides.insert(BoqField::Quantity, vec!["Menge".to_string()]);
        let catalog = AliasCatalog::default().with_overrides(&overrides);

        assert_eq!(catalog.aliases(BoqField::Quantity), &["Menge".to_string()]);
        assert!(catalog.aliases(BoqField::Uom).contains(&"uom".to_string()));

        let h = headers(&["Beschreibung", "Menge", "Unit"]);
        let mapping = detect_mapping(&h, &catalog);
        assert_eq!(mapping.header_for(BoqField::Quantity), Some("Menge"));
    }

    #[test]
    fn test_completeness_reports_missing_with_suggestion() {
        let h = headers(&["Description", "Qty", "Measure Type"]);
        let catalog = AliasCatalog::default();
        let mut mapping = detect_mapping(&h, &catalog);
        // "Measure Type" 先被类别字段占用; 释放后应作为计量单位的建议
        mapping.assignments.remove(&BoqField::Uom);
        mapping.assignments.remove(&BoqField::Category);

        let issue = check_completeness(&mapping, &h, &catalog).unwrap();
        let details = issue.details().unwrap();
        assert_eq!(details["missing"], json!(["uom"]));
        assert_eq!(details["suggestions"]["uom"], json!("Measure Type"));
        assert_eq!(issue.row(), 0);
    }

    #[test]
    fn test_completeness_ok_when_required_mapped() {
        let h = headers(&["Description", "Qty", "UOM"]);
        let catalog = AliasCatalog::default();
        let mapping = detect_mapping(&h, &catalog);
        assert!(check_completeness(&mapping, &h, &catalog).is_none());
    }
}
