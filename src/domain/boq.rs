// ==========================================
// BOQ 导入引擎 - 清单行领域模型
// ==========================================
// 职责: 原始单元格 / 原始行 / 规范字段 / 解析后清单项
// 红线: raw_data 仅用于追溯,业务逻辑只读强类型字段
// ==========================================

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// CellValue - 单元格值（保留文件原生类型）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl CellValue {
    /// 文本单元格构造（TRIM,空白 → Empty）
    pub fn from_text(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(trimmed.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// 类型名（用于错误信息）
    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Empty => "empty",
            CellValue::Text(_) => "string",
            CellValue::Number(_) => "number",
            CellValue::Bool(_) => "boolean",
            CellValue::Date(_) => "date",
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Number(n) => write!(f, "{}", format_number(*n)),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Date(dt) => {
                if dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 {
                    write!(f, "{}", dt.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S"))
                }
            }
        }
    }
}

/// 数值转文本: 整数值不带 ".0"
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

// ==========================================
// RawRow - 原始行（表头 → 单元格,保持列顺序）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    cells: Vec<(String, CellValue)>,
}

impl RawRow {
    pub fn new(cells: Vec<(String, CellValue)>) -> Self {
        Self { cells }
    }

    /// 按表头取值: 先精确匹配,再忽略大小写/首尾空白
    pub fn get(&self, header: &str) -> Option<&CellValue> {
        if let Some((_, value)) = self.cells.iter().find(|(h, _)| h == header) {
            return Some(value);
        }
        let wanted = header.trim().to_lowercase();
        self.cells
            .iter()
            .find(|(h, _)| h.trim().to_lowercase() == wanted)
            .map(|(_, value)| value)
    }

    pub fn cells(&self) -> &[(String, CellValue)] {
        &self.cells
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(h, _)| h.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// 是否整行空白
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.is_empty())
    }

    /// 追溯用的有序键值对
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.cells
            .iter()
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect()
    }
}

// ==========================================
// BoqField - 规范字段
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoqField {
    #[serde(alias = "lineNumber")]
    LineNumber,
    #[serde(alias = "itemCode")]
    ItemCode,
    Description,
    Category,
    Subcategory,
    Quantity,
    Uom,
    #[serde(alias = "unitPrice")]
    UnitPrice,
    #[serde(alias = "totalPrice")]
    TotalPrice,
    Phase,
    Task,
    Site,
    Vendor,
    Remarks,
}

impl BoqField {
    pub const ALL: [BoqField; 14] = [
        BoqField::LineNumber,
        BoqField::ItemCode,
        BoqField::Description,
        BoqField::Category,
        BoqField::Subcategory,
        BoqField::Quantity,
        BoqField::Uom,
        BoqField::UnitPrice,
        BoqField::TotalPrice,
        BoqField::Phase,
        BoqField::Task,
        BoqField::Site,
        BoqField::Vendor,
        BoqField::Remarks,
    ];

    /// 必填字段集合（完整性检查）
    pub const REQUIRED: [BoqField; 3] = [BoqField::Description, BoqField::Quantity, BoqField::Uom];

    /// 配置键（snake_case）
    pub fn key(&self) -> &'static str {
        match self {
            BoqField::LineNumber => "line_number",
            BoqField::ItemCode => "item_code",
            BoqField::Description => "description",
            BoqField::Category => "category",
            BoqField::Subcategory => "subcategory",
            BoqField::Quantity => "quantity",
            BoqField::Uom => "uom",
            BoqField::UnitPrice => "unit_price",
            BoqField::TotalPrice => "total_price",
            BoqField::Phase => "phase",
            BoqField::Task => "task",
            BoqField::Site => "site",
            BoqField::Vendor => "vendor",
            BoqField::Remarks => "remarks",
        }
    }

    /// 问题定位用的列名（camelCase）
    pub fn display_name(&self) -> &'static str {
        match self {
            BoqField::LineNumber => "lineNumber",
            BoqField::ItemCode => "itemCode",
            BoqField::Description => "description",
            BoqField::Category => "category",
            BoqField::Subcategory => "subcategory",
            BoqField::Quantity => "quantity",
            BoqField::Uom => "uom",
            BoqField::UnitPrice => "unitPrice",
            BoqField::TotalPrice => "totalPrice",
            BoqField::Phase => "phase",
            BoqField::Task => "task",
            BoqField::Site => "site",
            BoqField::Vendor => "vendor",
            BoqField::Remarks => "remarks",
        }
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }
}

impl fmt::Display for BoqField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for BoqField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        BoqField::ALL
            .iter()
            .copied()
            .find(|f| f.key().eq_ignore_ascii_case(wanted) || f.display_name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown BOQ field: {}", s))
    }
}

// ==========================================
// ParsedBoqItem - 解析后清单项（输出单元）
// ==========================================
// 生命周期: 行处理器创建后不可变,归 ImportResult 所有
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedBoqItem {
    pub row_number: usize,            // 源文件数据行号（1 起）
    pub line_number: i64,             // 清单行号（缺省 = row_number）
    #[serde(default)]
    pub line_number_defaulted: bool,  // 行号由 row_number 补齐（不参与重复行号检查）
    pub item_code: Option<String>,
    pub description: String,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub quantity: f64,
    pub uom: String,
    pub unit_price: Option<f64>,
    pub total_price: Option<f64>,
    pub phase: Option<String>,
    pub task: Option<String>,
    pub site: Option<String>,
    pub vendor: Option<String>,
    pub remarks: Option<String>,
    pub raw_data: Vec<(String, String)>, // 原始行（仅追溯）
}

impl ParsedBoqItem {
    /// 文本字段取值（数值字段返回 None）
    pub fn text(&self, field: BoqField) -> Option<&str> {
        match field {
            BoqField::ItemCode => self.item_code.as_deref(),
            BoqField::Description => Some(self.description.as_str()),
            BoqField::Category => self.category.as_deref(),
            BoqField::Subcategory => self.subcategory.as_deref(),
            BoqField::Uom => Some(self.uom.as_str()),
            BoqField::Phase => self.phase.as_deref(),
            BoqField::Task => self.task.as_deref(),
            BoqField::Site => self.site.as_deref(),
            BoqField::Vendor => self.vendor.as_deref(),
            BoqField::Remarks => self.remarks.as_deref(),
            BoqField::LineNumber
            | BoqField::Quantity
            | BoqField::UnitPrice
            | BoqField::TotalPrice => None,
        }
    }

    /// 数值字段取值（文本字段返回 None）
    pub fn number(&self, field: BoqField) -> Option<f64> {
        match field {
            BoqField::LineNumber => Some(self.line_number as f64),
            BoqField::Quantity => Some(self.quantity),
            BoqField::UnitPrice => self.unit_price,
            BoqField::TotalPrice => self.total_price,
            _ => None,
        }
    }

    pub fn is_numeric_field(field: BoqField) -> bool {
        matches!(
            field,
            BoqField::LineNumber | BoqField::Quantity | BoqField::UnitPrice | BoqField::TotalPrice
        )
    }
}
