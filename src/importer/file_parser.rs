// ==========================================
// BOQ 导入引擎 - 文件解析器实现
// ==========================================
// 职责: 文件字节 → 表头 + 原始行序列
// 支持: CSV (.csv, 自动探测分隔符) / Excel (.xlsx/.xls, 保留单元格类型)
// 红线: 仅按扩展名分派,不做内容嗅探
// ==========================================

use crate::domain::boq::{CellValue, RawRow};
use crate::importer::boq_importer_trait::FileParser;
use crate::importer::error::{EngineError, EngineResult};
use calamine::{Data, DataType, Range, Reader, Xls, Xlsx};
use csv::ReaderBuilder;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Cursor;
use tracing::{debug, warn};

/// 候选分隔符
const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// 分隔符探测采样行数
const DELIMITER_SAMPLE_LINES: usize = 10;

/// 解析选项
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub header_row: usize,          // 表头所在行（1 起）
    pub skip_rows: usize,           // 表头后跳过的行数
    pub sheet_name: Option<String>, // 指定工作表（缺省第一个）
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            header_row: 1,
            skip_rows: 0,
            sheet_name: None,
        }
    }
}

/// 解析结果
#[derive(Debug, Clone, Default)]
pub struct SheetData {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    pub delimiter: Option<u8>,
    pub sheet_name: Option<String>,
    pub encoding_replaced: bool, // 非 UTF-8 字节已替换为 U+FFFD
}

/// 支持的文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xlsx,
    Xls,
}

impl FileKind {
    /// 按扩展名判断文件类型
    pub fn from_file_name(file_name: &str) -> EngineResult<Self> {
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.trim().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(FileKind::Csv),
            "xlsx" => Ok(FileKind::Xlsx),
            "xls" => Ok(FileKind::Xls),
            "" => Err(EngineError::UnsupportedFormat(file_name.to_string())),
            other => Err(EngineError::UnsupportedFormat(format!(".{}", other))),
        }
    }
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse(&self, file_name: &str, bytes: &[u8], options: &ReadOptions) -> EngineResult<SheetData> {
        let decoded = String::from_utf8_lossy(bytes);
        let encoding_replaced = matches!(decoded, Cow::Owned(_));
        if encoding_replaced {
            warn!(file_name, "文件不是有效的 UTF-8，非法字节已替换");
        }
        let text = decoded.trim_start_matches('\u{feff}');

        if text.trim().is_empty() {
            return Err(EngineError::EmptyFile(file_name.to_string()));
        }

        let delimiter = detect_delimiter(text, options.header_row.max(1) - 1);
        debug!(delimiter = %(delimiter as char).escape_default(), "CSV 分隔符探测完成");

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .delimiter(delimiter)
            .quote(b'"')
            .double_quote(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(text.as_bytes());

        let mut lines: Vec<Vec<String>> = Vec::new();
        for result in reader.records() {
            let record = result?;
            lines.push(record.iter().map(|v| v.to_string()).collect());
        }

        let (headers, rows) = build_rows(file_name, lines, options, |v: String| CellValue::from_text(&v))?;

        Ok(SheetData {
            headers,
            rows,
            delimiter: Some(delimiter),
            sheet_name: None,
            encoding_replaced,
        })
    }
}

/// 探测分隔符: 从表头行起统计若干条记录中各候选符在引号外的出现次数,
/// 取每条记录计数最一致（方差最小,其次均值最大）的候选
pub fn detect_delimiter(text: &str, skip_lines: usize) -> u8 {
    let sample: Vec<&str> = split_records(text)
        .into_iter()
        .filter(|l| !l.trim().is_empty())
        .skip(skip_lines)
        .take(DELIMITER_SAMPLE_LINES)
        .collect();

    if sample.is_empty() {
        return b',';
    }

    let mut best: Option<(u8, f64, f64)> = None; // (分隔符, 方差, 均值)
    for &candidate in CANDIDATE_DELIMITERS.iter() {
        let counts: Vec<f64> = sample
            .iter()
            .map(|line| count_outside_quotes(line, candidate) as f64)
            .collect();

        // 表头行必须出现
        if counts[0] == 0.0 {
            continue;
        }

        let mean = counts.iter().sum::<f64>() / counts.len() as f64;
        let variance = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / counts.len() as f64;

        let better = match best {
            None => true,
            Some((_, best_var, best_mean)) => {
                variance < best_var - f64::EPSILON
                    || ((variance - best_var).abs() <= f64::EPSILON && mean > best_mean)
            }
        };
        if better {
            best = Some((candidate, variance, mean));
        }
    }

    best.map(|(d, _, _)| d).unwrap_or(b',')
}

/// 按引号外的换行切分记录（引号内换行属于同一字段）
fn split_records(text: &str) -> Vec<&str> {
    let mut records = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, b) in text.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'\n' if !in_quotes => {
                records.push(text[start..idx].trim_end_matches('\r'));
                start = idx + 1;
            }
            _ => {}
        }
    }
    if start < text.len() {
        records.push(&text[start..]);
    }
    records
}

fn count_outside_quotes(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for b in line.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser {
    kind: FileKind,
}

impl ExcelParser {
    pub fn xlsx() -> Self {
        Self { kind: FileKind::Xlsx }
    }

    pub fn xls() -> Self {
        Self { kind: FileKind::Xls }
    }
}

impl FileParser for ExcelParser {
    fn parse(&self, file_name: &str, bytes: &[u8], options: &ReadOptions) -> EngineResult<SheetData> {
        if bytes.is_empty() {
            return Err(EngineError::EmptyFile(file_name.to_string()));
        }

        let cursor = Cursor::new(bytes.to_vec());
        let (sheet_name, range) = match self.kind {
            FileKind::Xls => {
                let mut workbook: Xls<_> = Xls::new(cursor)
                    .map_err(|e| EngineError::WorkbookParse(e.to_string()))?;
                read_sheet(&mut workbook, options.sheet_name.as_deref())?
            }
            _ => {
                let mut workbook: Xlsx<_> = Xlsx::new(cursor)
                    .map_err(|e| EngineError::WorkbookParse(e.to_string()))?;
                read_sheet(&mut workbook, options.sheet_name.as_deref())?
            }
        };

        let lines: Vec<Vec<CellValue>> = range
            .rows()
            .map(|row| row.iter().map(convert_cell).collect())
            .collect();

        if lines.is_empty() {
            return Err(EngineError::EmptyFile(file_name.to_string()));
        }

        let (headers, rows) = build_rows(file_name, lines, options, |v| v)?;

        Ok(SheetData {
            headers,
            rows,
            delimiter: None,
            sheet_name: Some(sheet_name),
            encoding_replaced: false,
        })
    }
}

/// 读取指定工作表（缺省第一个）
fn read_sheet<R>(workbook: &mut R, wanted: Option<&str>) -> EngineResult<(String, Range<Data>)>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: std::fmt::Display,
{
    let sheet_names = workbook.sheet_names();
    let sheet_name = match wanted {
        Some(name) => sheet_names
            .iter()
            .find(|s| s.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| EngineError::SheetNotFound(name.to_string()))?,
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| EngineError::WorkbookParse("workbook has no worksheets".to_string()))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| EngineError::WorkbookParse(e.to_string()))?;

    Ok((sheet_name, range))
}

/// Excel 单元格 → CellValue（保留数值/日期/布尔类型）
fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => CellValue::from_text(s),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
            Some(dt) => CellValue::Date(dt),
            None => CellValue::from_text(&cell.to_string()),
        },
        Data::DurationIso(s) => CellValue::from_text(s),
    }
}

// ==========================================
// 表头与行构造（CSV / Excel 共用）
// ==========================================
fn build_rows<T, F>(
    file_name: &str,
    lines: Vec<Vec<T>>,
    options: &ReadOptions,
    to_cell: F,
) -> EngineResult<(Vec<String>, Vec<RawRow>)>
where
    T: ToString,
    F: Fn(T) -> CellValue,
{
    let header_index = options.header_row.max(1) - 1;
    let mut iter = lines.into_iter().skip(header_index);

    let header_line = iter
        .next()
        .ok_or_else(|| EngineError::EmptyFile(file_name.to_string()))?;

    let raw_headers: Vec<String> = header_line
        .into_iter()
        .map(|h| h.to_string().trim().to_string())
        .collect();

    if raw_headers.iter().all(|h| h.is_empty()) {
        return Err(EngineError::NoColumns(file_name.to_string()));
    }

    let headers = disambiguate_headers(raw_headers);

    let mut rows = Vec::new();
    for line in iter.skip(options.skip_rows) {
        let mut cells: Vec<(String, CellValue)> = Vec::with_capacity(headers.len());
        let mut values = line.into_iter();
        for header in &headers {
            let value = values.next().map(&to_cell).unwrap_or(CellValue::Empty);
            cells.push((header.clone(), value));
        }

        let row = RawRow::new(cells);
        // 跳过完全空白的行
        if row.is_blank() {
            continue;
        }
        rows.push(row);
    }

    Ok((headers, rows))
}

/// 空表头 → "Column N"; 重复表头 → "Name (2)"
fn disambiguate_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.into_iter()
        .enumerate()
        .map(|(idx, header)| {
            let base = if header.is_empty() {
                format!("Column {}", idx + 1)
            } else {
                header
            };
            let count = seen.entry(base.to_lowercase()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{} ({})", base, count)
            }
        })
        .collect()
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse(&self, file_name: &str, bytes: &[u8], options: &ReadOptions) -> EngineResult<SheetData> {
        match FileKind::from_file_name(file_name)? {
            FileKind::Csv => CsvParser.parse(file_name, bytes, options),
            FileKind::Xlsx => ExcelParser::xlsx().parse(file_name, bytes, options),
            FileKind::Xls => ExcelParser::xls().parse(file_name, bytes, options),
        }
    }
}
