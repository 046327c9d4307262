//! Selection-expression evaluation.
//!
//! Grammar (case-insensitive, whitespace-trimmed):
//!
//! ```text
//! selection := "all" | "" | page_list | "pages:" page_list
//!            | "sections:" id_list | id_list
//! page_list := page_elem ("," page_elem)*
//! page_elem := integer | integer "-" integer
//! id_list   := integer ("," integer)*
//! ```
//!
//! A bare integer list means PAGES; sections need the explicit prefix.

use crate::error::{Result, RptError};
use crate::rpt::Section;

/// Sorted, deduplicated list of 1-based page indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pages: Vec<u32>,
}

impl Selection {
    /// Evaluate an expression against the file's page/section universe.
    pub fn evaluate(expr: &str, page_count: u32, sections: &[Section]) -> Result<Self> {
        let trimmed = expr.trim();
        let lower = trimmed.to_ascii_lowercase();

        let mut pages = if lower.is_empty() || lower == "all" {
            (1..=page_count).collect()
        } else if let Some(rest) = lower.strip_prefix("pages:") {
            parse_page_list(rest, page_count)?
        } else if let Some(rest) = lower.strip_prefix("sections:") {
            parse_section_list(rest, sections)?
        } else {
            parse_page_list(&lower, page_count)?
        };

        pages.sort_unstable();
        pages.dedup();
        if pages.is_empty() {
            return Err(RptError::NoPagesSelected);
        }
        Ok(Self { pages })
    }

    pub fn pages(&self) -> &[u32] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

fn parse_int(text: &str) -> Result<u32> {
    text.trim()
        .parse()
        .map_err(|_| RptError::InvalidSelection(format!("not a number: {:?}", text.trim())))
}

fn parse_page_list(list: &str, page_count: u32) -> Result<Vec<u32>> {
    let mut pages = Vec::new();
    for elem in list.split(',') {
        let elem = elem.trim();
        if elem.is_empty() {
            return Err(RptError::InvalidSelection("empty list element".into()));
        }
        // A leading digit-dash split; page numbers are unsigned so '-' only
        // ever separates range endpoints.
        if let Some((lo, hi)) = elem.split_once('-') {
            let lo = parse_int(lo)?;
            let hi = parse_int(hi)?;
            if lo > hi {
                return Err(RptError::InvalidSelection(format!(
                    "descending range {lo}-{hi}"
                )));
            }
            check_page_bounds(lo, page_count)?;
            check_page_bounds(hi, page_count)?;
            pages.extend(lo..=hi);
        } else {
            let page = parse_int(elem)?;
            check_page_bounds(page, page_count)?;
            pages.push(page);
        }
    }
    Ok(pages)
}

fn check_page_bounds(page: u32, page_count: u32) -> Result<()> {
    if page == 0 || page > page_count {
        return Err(RptError::InvalidSelection(format!(
            "page {page} outside 1..={page_count}"
        )));
    }
    Ok(())
}

fn parse_section_list(list: &str, sections: &[Section]) -> Result<Vec<u32>> {
    let mut pages = Vec::new();
    for elem in list.split(',') {
        let id = parse_int(elem)?;
        let section = sections
            .iter()
            .find(|s| s.section_id == id)
            .ok_or_else(|| RptError::InvalidSelection(format!("unknown section id {id}")))?;
        pages.extend(section.start_page..section.start_page + section.page_count);
    }
    Ok(pages)
}
