//! Upstream grid payload
//!
//! Mirrors the JSON returned by the spreadsheet provider. Every field is
//! optional and unknown shapes collapse to `None` here, so nothing past the
//! parser has to deal with the loose upstream format.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// A fetch result: either one sheet or a whole spreadsheet of tabs
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UpstreamPayload {
    Spreadsheet(UpstreamSpreadsheet),
    Sheet(UpstreamSheet),
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSpreadsheet {
    pub sheets: Vec<UpstreamSheet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamSheet {
    #[serde(default, deserialize_with = "lenient")]
    pub properties: Option<SheetProperties>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub data: Vec<GridData>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub merges: Vec<GridRange>,
}

impl UpstreamSheet {
    pub fn title(&self) -> Option<&str> {
        self.properties.as_ref().and_then(|p| p.title.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SheetProperties {
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,
}

/// One region block of rows
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridData {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub row_data: Vec<RowData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RowData {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub values: Vec<CellData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellData {
    #[serde(default, deserialize_with = "lenient")]
    pub formatted_value: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user_entered_value: Option<ExtendedValue>,
    #[serde(default, deserialize_with = "lenient")]
    pub hyperlink: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user_entered_format: Option<CellFormat>,
}

/// Typed cell value; exactly one key is present upstream
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtendedValue {
    StringValue(String),
    NumberValue(f64),
    BoolValue(bool),
    FormulaValue(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellFormat {
    #[serde(default, deserialize_with = "lenient")]
    pub text_format: Option<TextFormat>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextFormat {
    #[serde(default, deserialize_with = "lenient")]
    pub link: Option<Link>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Link {
    #[serde(default, deserialize_with = "lenient")]
    pub uri: Option<String>,
}

/// Merge range in absolute sheet coordinates (header is row 0)
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRange {
    #[serde(default, alias = "startRow")]
    pub start_row_index: Option<i64>,
    #[serde(default, alias = "endRow")]
    pub end_row_index: Option<i64>,
    #[serde(default, alias = "startCol")]
    pub start_column_index: Option<i64>,
    #[serde(default, alias = "endCol")]
    pub end_column_index: Option<i64>,
}

impl CellData {
    /// Display text of the cell
    pub fn text(&self) -> String {
        if let Some(formatted) = &self.formatted_value {
            return formatted.clone();
        }
        match &self.user_entered_value {
            Some(ExtendedValue::StringValue(s)) => s.clone(),
            Some(ExtendedValue::NumberValue(n)) => format_number(*n),
            Some(ExtendedValue::BoolValue(b)) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Some(ExtendedValue::FormulaValue(f)) => f.clone(),
            None => String::new(),
        }
    }

    /// Link candidates in precedence order: text-format link, then direct
    /// hyperlink. URLs are passed through verbatim; blank ones are dropped.
    pub fn link_candidates(&self) -> impl Iterator<Item = &str> {
        let format_link = self
            .user_entered_format
            .as_ref()
            .and_then(|f| f.text_format.as_ref())
            .and_then(|t| t.link.as_ref())
            .and_then(|l| l.uri.as_deref());
        format_link
            .into_iter()
            .chain(self.hyperlink.as_deref())
            .filter(|u| !u.trim().is_empty())
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Deserialize a value, turning any shape mismatch into `None`
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Deserialize a list, dropping it when it is not an array and dropping
/// elements that do not match the expected shape
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()),
        _ => Ok(Vec::new()),
    }
}
