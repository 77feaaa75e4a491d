//! Coercion of a free-form model reply into the fixed record schema.
//!
//! The prompt demands a JSON array of objects, but models ignore contracts,
//! so the parser walks a ladder of grammars: fenced JSON, a bare JSON array
//! located by bracket scanning, a markdown pipe table, and finally plain
//! tab/comma-delimited lines. The first grammar that yields at least one
//! non-empty record wins.

use regex::Regex;
use rowforge_types::{Result, Value, bail};
use std::sync::OnceLock;

/// Output schema, in column order.
pub const FIELDS: [&str; 10] = [
    "unit",
    "daily_target",
    "daily_actual",
    "daily_rate",
    "monthly_target",
    "monthly_actual",
    "monthly_rate",
    "score",
    "region",
    "product",
];

/// Accepted key spellings per field, normalized form (lowercased, separators
/// stripped). Models echo headers in whatever language the sheet used, so
/// the original Chinese report headers are included.
const ALIASES: [(&str, &[&str]); 10] = [
    ("unit", &["unit", "unitname", "name", "grid", "单位名称", "单位", "网格"]),
    ("daily_target", &["dailytarget", "daytarget", "日目标"]),
    ("daily_actual", &["dailyactual", "dayactual", "dailydev", "日发展"]),
    ("daily_rate", &["dailyrate", "dailycompletionrate", "日发展完成率", "日完成率"]),
    ("monthly_target", &["monthlytarget", "monthtarget", "月目标"]),
    ("monthly_actual", &["monthlyactual", "monthactual", "monthlycumulative", "月累计发展", "月累计"]),
    ("monthly_rate", &["monthlyrate", "monthrate", "月完成率"]),
    ("score", &["score", "得分", "分数"]),
    ("region", &["region", "county", "旗县", "区域"]),
    ("product", &["product", "产品"]),
];

/// One normalized output row; values stay strings end to end.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Record {
    pub unit: String,
    pub daily_target: String,
    pub daily_actual: String,
    pub daily_rate: String,
    pub monthly_target: String,
    pub monthly_actual: String,
    pub monthly_rate: String,
    pub score: String,
    pub region: String,
    pub product: String,
}

impl Record {
    pub fn values(&self) -> [&str; 10] {
        [
            &self.unit,
            &self.daily_target,
            &self.daily_actual,
            &self.daily_rate,
            &self.monthly_target,
            &self.monthly_actual,
            &self.monthly_rate,
            &self.score,
            &self.region,
            &self.product,
        ]
    }

    /// Positional construction; short rows are padded, long ones truncated.
    pub fn from_values<I>(values: I) -> Record
    where
        I: IntoIterator<Item = String>,
    {
        let mut it = values.into_iter();
        let mut take = || it.next().unwrap_or_default().trim().to_string();
        Record {
            unit: take(),
            daily_target: take(),
            daily_actual: take(),
            daily_rate: take(),
            monthly_target: take(),
            monthly_actual: take(),
            monthly_rate: take(),
            score: take(),
            region: take(),
            product: take(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values().iter().all(|v| v.trim().is_empty())
    }

    /// Fill region/product from the directive when the model left them
    /// blank.
    pub fn apply_defaults(&mut self, region: &str, product: &str) {
        if self.region.trim().is_empty() {
            self.region = region.to_string();
        }
        if self.product.trim().is_empty() {
            self.product = product.to_string();
        }
    }
}

fn normalize_key(key: &str) -> String {
    key.trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-' | '.'))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn canonical_field(key: &str) -> Option<&'static str> {
    let norm = normalize_key(key);
    ALIASES
        .iter()
        .find(|(field, aliases)| norm == *field || aliases.contains(&norm.as_str()))
        .map(|(field, _)| *field)
}

/// Render a JSON value the way sheet cells are rendered: integral floats
/// without a decimal point, null as empty.
fn value_to_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && n.as_i64().is_none() && f.abs() < 9_007_199_254_740_992.0 {
                    return format!("{:.0}", f);
                }
            }
            n.to_string()
        }
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        other => other.to_string(),
    }
}

/// Parse the model reply. Errors carry a truncated snippet for the job log.
pub fn parse_reply(text: &str) -> Result<Vec<Record>> {
    for body in fenced_blocks(text) {
        if let Some(records) = try_json(&body) {
            return Ok(records);
        }
    }
    if let Some(records) = scan_json_arrays(text).iter().find_map(|s| try_json(s)) {
        return Ok(records);
    }
    if let Some(records) = try_pipe_table(text) {
        return Ok(records);
    }
    if let Some(records) = try_delimited(text) {
        return Ok(records);
    }

    let snippet: String = text.chars().take(200).collect();
    bail!("model reply matched no known grammar: {:?}", snippet);
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*\r?\n(.*?)```").expect("static regex"))
}

fn fenced_blocks(text: &str) -> Vec<String> {
    fence_regex()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Balanced `[...]` spans in the text, leftmost first, found with a
/// string-aware bracket depth scan so brackets inside JSON strings do not
/// confuse it. Prose like `[Note]` ahead of the payload yields a span too;
/// the caller rejects it at parse time and moves on to the next one.
fn scan_json_arrays(text: &str) -> Vec<String> {
    let mut spans = Vec::new();
    let mut search = 0;
    while let Some(offset) = text[search..].find('[') {
        let start = search + offset;
        if let Some(end) = balanced_array_end(text, start) {
            spans.push(text[start..=end].to_string());
        }
        search = start + 1;
    }
    spans
}

/// Index of the `]` closing the `[` at `start`, or `None` if it never
/// closes.
fn balanced_array_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in text.as_bytes().iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn try_json(body: &str) -> Option<Vec<Record>> {
    let value: Value = serde_json::from_str(body.trim()).ok()?;
    let items = value.as_array()?;
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        let record = match item {
            Value::Object(map) => {
                let mut record = Record::default();
                for (key, value) in map {
                    let Some(field) = canonical_field(key) else {
                        continue;
                    };
                    let rendered = value_to_string(value);
                    match field {
                        "unit" => record.unit = rendered,
                        "daily_target" => record.daily_target = rendered,
                        "daily_actual" => record.daily_actual = rendered,
                        "daily_rate" => record.daily_rate = rendered,
                        "monthly_target" => record.monthly_target = rendered,
                        "monthly_actual" => record.monthly_actual = rendered,
                        "monthly_rate" => record.monthly_rate = rendered,
                        "score" => record.score = rendered,
                        "region" => record.region = rendered,
                        "product" => record.product = rendered,
                        _ => {}
                    }
                }
                record
            }
            Value::Array(cells) => Record::from_values(cells.iter().map(value_to_string)),
            _ => continue,
        };
        if !record.is_empty() {
            records.push(record);
        }
    }
    if records.is_empty() { None } else { Some(records) }
}

/// A row that just echoes the column headers back.
fn is_header_row(cells: &[String]) -> bool {
    if cells.is_empty() {
        return false;
    }
    let recognized = cells.iter().filter(|c| canonical_field(c).is_some()).count();
    recognized * 2 >= cells.len() && recognized >= 1
}

fn is_separator_row(cells: &[String]) -> bool {
    !cells.is_empty()
        && cells
            .iter()
            .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | '=')))
}

fn try_pipe_table(text: &str) -> Option<Vec<Record>> {
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if !line.contains('|') {
            continue;
        }
        let cells: Vec<String> = line
            .trim_matches('|')
            .split('|')
            .map(|c| c.trim().to_string())
            .collect();
        if cells.len() < 2 || is_separator_row(&cells) || is_header_row(&cells) {
            continue;
        }
        let record = Record::from_values(cells.into_iter());
        if !record.is_empty() {
            records.push(record);
        }
    }
    if records.is_empty() { None } else { Some(records) }
}

fn try_delimited(text: &str) -> Option<Vec<Record>> {
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let cells: Vec<String> = if line.contains('\t') {
            line.split('\t').map(|c| c.trim().to_string()).collect()
        } else if line.contains(',') {
            line.split(',').map(|c| c.trim().to_string()).collect()
        } else {
            continue;
        };
        if cells.len() < 3 || is_header_row(&cells) {
            continue;
        }
        let record = Record::from_values(cells.into_iter());
        if !record.is_empty() {
            records.push(record);
        }
    }
    if records.is_empty() { None } else { Some(records) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_objects() -> String {
        r#"[
            {"unit": "A grid", "daily_target": 10, "daily_actual": 3,
             "daily_rate": "30%", "monthly_target": 300, "monthly_actual": 120,
             "monthly_rate": "40%", "score": 85, "region": "North", "product": "P1"}
        ]"#
        .to_string()
    }

    #[test]
    fn fenced_json_objects() {
        let reply = format!("Here is the mapping:\n```json\n{}\n```\nDone.", sample_objects());
        let records = parse_reply(&reply).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].unit, "A grid");
        assert_eq!(records[0].daily_target, "10");
        assert_eq!(records[0].score, "85");
    }

    #[test]
    fn untagged_fence_is_accepted() {
        let reply = format!("```\n{}\n```", sample_objects());
        assert_eq!(parse_reply(&reply).unwrap().len(), 1);
    }

    #[test]
    fn bare_array_with_prose_around_it() {
        let reply = format!("Sure! The rows are {} and that is all.", sample_objects());
        let records = parse_reply(&reply).unwrap();
        assert_eq!(records[0].region, "North");
    }

    #[test]
    fn prose_brackets_before_the_array_are_skipped() {
        let reply = format!(
            "[Note]: the window had a title row, skipped.\nHere you go: {}",
            sample_objects()
        );
        let records = parse_reply(&reply).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].unit, "A grid");
    }

    #[test]
    fn brackets_inside_strings_do_not_break_the_scan() {
        let reply = r#"noise [{"unit": "grid [east]", "score": 9}] noise"#;
        let records = parse_reply(reply).unwrap();
        assert_eq!(records[0].unit, "grid [east]");
    }

    #[test]
    fn key_aliases_and_chinese_headers() {
        let reply = r#"[{"unit_name": "B", "日目标": 8, "County": "West", "Daily Rate": "62.5%"}]"#;
        let records = parse_reply(reply).unwrap();
        assert_eq!(records[0].unit, "B");
        assert_eq!(records[0].daily_target, "8");
        assert_eq!(records[0].region, "West");
        assert_eq!(records[0].daily_rate, "62.5%");
    }

    #[test]
    fn array_of_arrays_is_positional() {
        let reply = r#"[["A", 10, 3, "30%", 300, 120, "40%", 85, "North", "P1"], ["B", 8]]"#;
        let records = parse_reply(reply).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].product, "P1");
        assert_eq!(records[1].unit, "B");
        assert_eq!(records[1].product, "");
    }

    #[test]
    fn markdown_pipe_table() {
        let reply = "\
| unit | daily_target | daily_actual | daily_rate | monthly_target | monthly_actual | monthly_rate | score | region | product |
|------|----|---|-----|-----|-----|-----|----|-------|----|
| A    | 10 | 3 | 30% | 300 | 120 | 40% | 85 | North | P1 |
| B    | 8  | 5 | 62% | 200 | 160 | 80% | 92 | West  | P2 |";
        let records = parse_reply(reply).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].unit, "B");
        assert_eq!(records[1].monthly_rate, "80%");
    }

    #[test]
    fn tab_delimited_lines() {
        let reply = "unit\tdaily_target\tscore\nA\t10\t85\nB\t8\t92";
        let records = parse_reply(reply).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].daily_target, "10");
        assert_eq!(records[0].product, "");
    }

    #[test]
    fn comma_delimited_lines() {
        let reply = "A, 10, 3, 30%\nB, 8, 5, 62%";
        let records = parse_reply(reply).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].daily_rate, "62%");
    }

    #[test]
    fn integral_json_floats_render_like_cells() {
        let reply = r#"[{"unit": "A", "monthly_target": 300.0, "daily_rate": 0.5}]"#;
        let records = parse_reply(reply).unwrap();
        assert_eq!(records[0].monthly_target, "300");
        assert_eq!(records[0].daily_rate, "0.5");
    }

    #[test]
    fn empty_rows_are_dropped() {
        let reply = r#"[{"unit": ""}, {"unit": "A"}]"#;
        let records = parse_reply(reply).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn hopeless_reply_is_an_error() {
        let err = parse_reply("I could not find any tabular data in this sheet.").unwrap_err();
        assert!(err.to_string().contains("no known grammar"));
    }

    #[test]
    fn defaults_fill_only_blank_fields() {
        let mut record = Record::from_values(["A".to_string()]);
        record.apply_defaults("North", "P1");
        assert_eq!(record.region, "North");
        record.apply_defaults("South", "P2");
        assert_eq!(record.region, "North");
    }
}
