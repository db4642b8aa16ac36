//! 通用工具函数

use chrono::NaiveDate;

/// 病例号前缀
pub const CASE_NUMBER_PREFIX: &str = "EM";

/// 每日最大序号，保证序号固定为四位
pub const MAX_DAILY_SEQUENCE: u32 = 9999;

/// 生成病例号，格式为 `EM{YYYYMMDD}-{NNNN}`
pub fn format_case_number(arrival_date: NaiveDate, sequence: u32) -> String {
    format!(
        "{}{}-{:04}",
        CASE_NUMBER_PREFIX,
        arrival_date.format("%Y%m%d"),
        sequence
    )
}

/// 解析病例号，返回到达日期和当日序号
pub fn parse_case_number(case_number: &str) -> Option<(NaiveDate, u32)> {
    let rest = case_number.strip_prefix(CASE_NUMBER_PREFIX)?;
    let (date_part, seq_part) = rest.split_once('-')?;
    if date_part.len() != 8 || seq_part.len() != 4 {
        return None;
    }
    let date = NaiveDate::parse_from_str(date_part, "%Y%m%d").ok()?;
    let sequence: u32 = seq_part.parse().ok()?;
    if sequence == 0 {
        return None;
    }
    Some((date, sequence))
}

/// 验证病例号格式
pub fn is_valid_case_number(case_number: &str) -> bool {
    parse_case_number(case_number).is_some()
}
