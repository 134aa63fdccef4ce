// ==========================================
// BOQ 导入引擎 - 数据清洗器实现
// ==========================================
// 职责: 单元格 → 文本 / 数值 的容错转换
// 数值: 去货币符号 / 千分位 / 空格 / 百分号,括号表示负数
// 文本: TRIM,空白 → None
// ==========================================

use crate::domain::boq::{format_number, CellValue};

/// 可剥离的货币符号
const CURRENCY_SYMBOLS: [char; 4] = ['$', '€', '£', '¥'];

/// 数值转换结果
#[derive(Debug, Clone, PartialEq)]
pub enum NumericCell {
    Value(f64),
    FromBool(f64), // 布尔值按 1/0 转换（需警告）
    Empty,
    Invalid(String), // 原始文本
}

pub struct DataCleaner;

impl DataCleaner {
    /// 清洗文本（TRIM,空白 → None）
    pub fn clean_text(&self, value: &str) -> Option<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// 单元格转文本: 数值不带 ".0",日期为 ISO 格式
    pub fn cell_to_text(&self, cell: Option<&CellValue>) -> Option<String> {
        match cell? {
            CellValue::Empty => None,
            CellValue::Text(s) => self.clean_text(s),
            CellValue::Number(n) => Some(format_number(*n)),
            CellValue::Bool(b) => Some(b.to_string()),
            date @ CellValue::Date(_) => Some(date.to_string()),
        }
    }

    /// 单元格转数值
    pub fn cell_to_number(&self, cell: Option<&CellValue>) -> NumericCell {
        match cell {
            None | Some(CellValue::Empty) => NumericCell::Empty,
            Some(CellValue::Number(n)) if n.is_finite() => NumericCell::Value(*n),
            Some(CellValue::Number(n)) => NumericCell::Invalid(n.to_string()),
            Some(CellValue::Bool(b)) => NumericCell::FromBool(if *b { 1.0 } else { 0.0 }),
            Some(CellValue::Text(s)) => {
                if s.trim().is_empty() {
                    return NumericCell::Empty;
                }
                match self.parse_numeric_text(s) {
                    Some(v) => NumericCell::Value(v),
                    None => NumericCell::Invalid(s.clone()),
                }
            }
            Some(date @ CellValue::Date(_)) => NumericCell::Invalid(date.to_string()),
        }
    }

    /// 解析带格式的数值文本
    ///
    /// 支持: "1,250" / "$45.00" / "R 1 200" / "(300)" / "12.5%" / "-7"
    pub fn parse_numeric_text(&self, raw: &str) -> Option<f64> {
        let mut text = raw.trim();

        let negative = text.starts_with('(') && text.ends_with(')') && text.len() >= 2;
        if negative {
            text = &text[1..text.len() - 1];
        }

        let mut cleaned: String = text
            .chars()
            .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != ',' && !c.is_whitespace())
            .collect();

        // 兰特前缀（R100 / -R100）
        if let Some(rest) = cleaned.strip_prefix('R') {
            cleaned = rest.to_string();
        } else if let Some(rest) = cleaned.strip_prefix("-R") {
            cleaned = format!("-{}", rest);
        }

        if let Some(rest) = cleaned.strip_suffix('%') {
            cleaned = rest.to_string();
        }

        if cleaned.is_empty() {
            return None;
        }

        let value: f64 = cleaned.parse().ok()?;
        if !value.is_finite() {
            return None;
        }

        Some(if negative { -value } else { value })
    }
}
