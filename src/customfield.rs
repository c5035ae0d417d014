//! カスタムフィールド識別子の正規化
//!
//! 同じフィールドが `cf[12345]`（JQL）、`customfield_12345`（REST）、
//! `12345`（数値のみ）の3通りで表記されるため、ここで整数に揃える。

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::models::Field;

const PREFIX_CUSTOMFIELD: &str = "customfield_";
const PREFIX_BRACKETED: &str = "cf[";

/// カスタムフィールドID（非負整数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CustomFieldId(pub u64);

impl CustomFieldId {
    pub fn parse(s: &str) -> Result<Self> {
        parse(s).map(CustomFieldId)
    }

    pub fn bracketed(&self) -> String {
        format_bracketed(self.0)
    }

    pub fn prefixed(&self) -> String {
        format_prefixed(self.0)
    }
}

impl fmt::Display for CustomFieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PREFIX_CUSTOMFIELD, self.0)
    }
}

impl FromStr for CustomFieldId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// 3つの表記のいずれかを整数に変換
///
/// 前後の空白は許容し、接頭辞は大文字小文字を区別しない。
pub fn parse(s: &str) -> Result<u64> {
    let lowered = s.trim().to_lowercase();

    let digits = if let Some(rest) = lowered.strip_prefix(PREFIX_CUSTOMFIELD) {
        rest
    } else if let Some(rest) = lowered.strip_prefix(PREFIX_BRACKETED) {
        rest.strip_suffix(']').ok_or_else(|| invalid_format(s))?
    } else {
        lowered.as_str()
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid_format(s));
    }
    digits.parse::<u64>().map_err(|_| invalid_format(s))
}

fn invalid_format(s: &str) -> Error {
    Error::InvalidInput(format!("invalid custom field identifier format: '{}'", s))
}

pub fn format_bracketed(n: u64) -> String {
    format!("cf[{}]", n)
}

pub fn format_prefixed(n: u64) -> String {
    format!("{}{}", PREFIX_CUSTOMFIELD, n)
}

/// `customfield_<n>` 形式に正規化
pub fn canonicalize(s: &str) -> Result<String> {
    parse(s).map(format_prefixed)
}

/// 失敗しない判定版。カスタムフィールドでなければ入力をそのまま返す
pub fn is_custom(s: &str) -> (String, bool) {
    match canonicalize(s) {
        Ok(canonical) => (canonical, true),
        Err(_) => (s.to_string(), false),
    }
}

/// `GET /rest/api/2/field` の結果から名前でフィールドを引くための集合
#[derive(Debug, Clone, Default)]
pub struct CustomFieldSet {
    fields: Vec<Field>,
}

impl CustomFieldSet {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// カスタムフィールドのみ
    pub fn custom_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| f.custom.unwrap_or(false) || is_custom(&f.id).1)
    }

    /// 表示名・翻訳前の名前・JQL句名のいずれかで検索（大文字小文字は無視）
    pub fn by_name(&self, name: &str) -> Vec<&Field> {
        let wanted = name.trim().to_lowercase();
        self.fields
            .iter()
            .filter(|f| {
                f.name.to_lowercase() == wanted
                    || f.untranslated_name
                        .as_deref()
                        .map(|n| n.to_lowercase() == wanted)
                        .unwrap_or(false)
                    || f.clause_names.iter().any(|c| c.to_lowercase() == wanted)
            })
            .collect()
    }

    /// 名前に対応するカスタムフィールドの正規ID。該当なし・複数該当はエラー
    pub fn id_for_name(&self, name: &str) -> Result<CustomFieldId> {
        let matches: Vec<&Field> = self
            .by_name(name)
            .into_iter()
            .filter(|f| is_custom(&f.id).1)
            .collect();
        match matches.as_slice() {
            [] => Err(Error::NotFound(format!("custom field named '{}'", name))),
            [field] => CustomFieldId::parse(&field.id),
            many => Err(Error::Ambiguous {
                key: name.to_string(),
                count: many.len(),
            }),
        }
    }
}
