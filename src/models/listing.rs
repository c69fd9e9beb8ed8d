//! Listing query parameters, their validated form, and the page handed back.

use crate::models::object::FileEntry;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, str::FromStr};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 1000;

/// Raw query string of `GET /files`. Kept as strings so bad values become
/// itemized validation errors rather than extractor rejections.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesParams {
    pub keyword: Option<String>,
    pub prefix: Option<String>,
    pub limit: Option<String>,
    pub marker: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    Filename,
    Size,
    Category,
    #[default]
    LastModified,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "filename" => Ok(Self::Filename),
            "size" => Ok(Self::Size),
            "category" => Ok(Self::Category),
            "lastModified" => Ok(Self::LastModified),
            other => Err(format!(
                "sortBy must be one of filename, size, category, lastModified (got `{other}`)"
            )),
        }
    }
}

impl SortBy {
    /// Ascending comparison of two entries on this field.
    pub fn compare(self, a: &FileEntry, b: &FileEntry) -> Ordering {
        match self {
            Self::Filename => cmp_ignore_case(&a.filename, &b.filename),
            Self::Size => a.size.cmp(&b.size),
            Self::Category => cmp_ignore_case(&a.category, &b.category),
            Self::LastModified => a.last_modified.cmp(&b.last_modified),
        }
    }
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("sortOrder must be asc or desc (got `{other}`)")),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

/// Keyword and date-range predicates, combined with logical AND.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileFilter {
    /// Stored lowercased.
    pub keyword: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl FileFilter {
    pub fn is_active(&self) -> bool {
        self.keyword.is_some() || self.start.is_some() || self.end.is_some()
    }

    pub fn matches(&self, entry: &FileEntry) -> bool {
        if let Some(keyword) = &self.keyword {
            if !entry.search_text().contains(keyword.as_str()) {
                return false;
            }
        }
        if let Some(start) = self.start {
            if entry.last_modified < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if entry.last_modified > end {
                return false;
            }
        }
        true
    }
}

/// A validated listing request.
#[derive(Clone, Debug, PartialEq)]
pub struct ListingQuery {
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub limit: usize,
    pub filter: FileFilter,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            prefix: None,
            marker: None,
            limit: DEFAULT_LIMIT,
            filter: FileFilter::default(),
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl ListingQuery {
    /// Validate raw parameters, collecting every violation.
    pub fn parse(params: &ListFilesParams) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();

        let limit = match non_empty(&params.limit) {
            None => DEFAULT_LIMIT,
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if (1..=MAX_LIMIT).contains(&n) => n,
                _ => {
                    errors.push(format!(
                        "limit must be an integer between 1 and {MAX_LIMIT} (got `{raw}`)"
                    ));
                    DEFAULT_LIMIT
                }
            },
        };

        let sort_by = non_empty(&params.sort_by)
            .map(SortBy::from_str)
            .transpose()
            .unwrap_or_else(|err| {
                errors.push(err);
                None
            })
            .unwrap_or_default();
        let sort_order = non_empty(&params.sort_order)
            .map(SortOrder::from_str)
            .transpose()
            .unwrap_or_else(|err| {
                errors.push(err);
                None
            })
            .unwrap_or_default();

        let start_date = parse_date("startDate", &params.start_date, &mut errors);
        let end_date = parse_date("endDate", &params.end_date, &mut errors);
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                errors.push("startDate must not be after endDate".to_string());
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            prefix: non_empty(&params.prefix).map(str::to_string),
            marker: non_empty(&params.marker).map(str::to_string),
            limit,
            filter: FileFilter {
                keyword: non_empty(&params.keyword).map(str::to_lowercase),
                start: start_date.map(start_of_day),
                end: end_date.and_then(end_of_day),
            },
            sort_by,
            sort_order,
        })
    }

    /// How many raw records to pull past the marker before filtering.
    pub fn fetch_window(&self) -> usize {
        if self.filter.is_active() {
            self.limit.saturating_mul(2)
        } else {
            self.limit
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(name: &str, raw: &Option<String>, errors: &mut Vec<String>) -> Option<NaiveDate> {
    let raw = non_empty(raw)?;
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    errors.push(format!(
        "{name} must be a date (YYYY-MM-DD) or RFC 3339 timestamp (got `{raw}`)"
    ));
    None
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_milli_opt(23, 59, 59, 999).map(|dt| dt.and_utc())
}

/// Echo of the effective query in the listing response.
#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryEcho {
    pub keyword: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub limit: usize,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl QueryEcho {
    pub fn new(params: &ListFilesParams, query: &ListingQuery) -> Self {
        Self {
            keyword: non_empty(&params.keyword).map(str::to_string),
            start_date: non_empty(&params.start_date).map(str::to_string),
            end_date: non_empty(&params.end_date).map(str::to_string),
            prefix: query.prefix.clone(),
            marker: query.marker.clone(),
            limit: query.limit,
            sort_by: query.sort_by,
            sort_order: query.sort_order,
        }
    }
}

/// One page of a listing.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    pub files: Vec<FileEntry>,
    pub next_marker: Option<String>,
    pub has_more: bool,
    pub total_found: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params(pairs: &[(&str, &str)]) -> ListFilesParams {
        let mut p = ListFilesParams::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "keyword" => p.keyword = v,
                "prefix" => p.prefix = v,
                "limit" => p.limit = v,
                "marker" => p.marker = v,
                "startDate" => p.start_date = v,
                "endDate" => p.end_date = v,
                "sortBy" => p.sort_by = v,
                "sortOrder" => p.sort_order = v,
                other => panic!("unknown param {other}"),
            }
        }
        p
    }

    fn entry_at(ts: DateTime<Utc>) -> FileEntry {
        FileEntry {
            file_id: "id".into(),
            object_name: "docs/id-report.pdf".into(),
            category: "docs".into(),
            filename: "Report.pdf".into(),
            size: 1,
            last_modified: ts,
            etag: None,
            content_type: None,
        }
    }

    #[test]
    fn defaults_apply_when_nothing_given() {
        let q = ListingQuery::parse(&ListFilesParams::default()).unwrap();
        assert_eq!(q, ListingQuery::default());
        assert_eq!(q.fetch_window(), DEFAULT_LIMIT);
    }

    #[test]
    fn filters_double_the_fetch_window() {
        let q = ListingQuery::parse(&params(&[("limit", "5"), ("keyword", "x")])).unwrap();
        assert_eq!(q.fetch_window(), 10);
    }

    #[test]
    fn collects_every_violation() {
        let errors = ListingQuery::parse(&params(&[
            ("limit", "0"),
            ("sortBy", "owner"),
            ("sortOrder", "sideways"),
            ("startDate", "yesterday"),
        ]))
        .unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors[0].starts_with("limit"));
        assert!(errors[1].starts_with("sortBy"));
        assert!(errors[2].starts_with("sortOrder"));
        assert!(errors[3].starts_with("startDate"));
    }

    #[test]
    fn rejects_inverted_date_range() {
        let errors =
            ListingQuery::parse(&params(&[("startDate", "2024-02-01"), ("endDate", "2024-01-01")]))
                .unwrap_err();
        assert_eq!(errors, vec!["startDate must not be after endDate"]);
    }

    #[test]
    fn single_day_range_covers_both_boundaries() {
        let q = ListingQuery::parse(&params(&[("startDate", "2024-01-01"), ("endDate", "2024-01-01")]))
            .unwrap();
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap()
            + chrono::Duration::milliseconds(999);
        let before = first - chrono::Duration::milliseconds(1);
        let after = last + chrono::Duration::milliseconds(1);

        assert!(q.filter.matches(&entry_at(first)));
        assert!(q.filter.matches(&entry_at(last)));
        assert!(!q.filter.matches(&entry_at(before)));
        assert!(!q.filter.matches(&entry_at(after)));
    }

    #[test]
    fn keyword_is_case_insensitive_over_name_and_category() {
        let now = Utc::now();
        let by_name = ListingQuery::parse(&params(&[("keyword", "REPORT")])).unwrap();
        let by_category = ListingQuery::parse(&params(&[("keyword", "Docs")])).unwrap();
        let miss = ListingQuery::parse(&params(&[("keyword", "invoice")])).unwrap();
        assert!(by_name.filter.matches(&entry_at(now)));
        assert!(by_category.filter.matches(&entry_at(now)));
        assert!(!miss.filter.matches(&entry_at(now)));
    }

    #[test]
    fn rfc3339_dates_are_truncated_to_their_day() {
        let q = ListingQuery::parse(&params(&[("startDate", "2024-03-05T17:30:00Z")])).unwrap();
        assert_eq!(
            q.filter.start,
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap())
        );
    }
}
