//! Parser for ratings files.
//!
//! Two layouts are accepted, detected line by line:
//! - MovieLens `.dat`: `userId::itemId::rating::timestamp`
//! - delimited text: `userId,itemId,rating[,timestamp]` (comma or tab)
//!
//! A header line is tolerated as the first non-empty line when its user
//! field is not a number.
//!
//! Item catalogs (`movies.dat`, `movies.csv`, a jokes table, ...) are read
//! the same way into an [`ItemTitles`] map so results can be shown by name.

use crate::error::{DataLoadError, Result};
use crate::types::{ItemId, ItemTitles, Rating};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Helper function to read a file with ISO-8859-1 encoding (Latin-1)
///
/// MovieLens files use ISO-8859-1, not UTF-8. Every Latin-1 byte maps
/// directly to the Unicode code point with the same value.
fn read_latin1(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => DataLoadError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => DataLoadError::IoError(e),
    })?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    Ok(bytes.iter().map(|&b| b as char).collect())
}

/// Parse a ratings file from disk
pub fn parse_ratings(path: &Path) -> Result<Vec<Rating>> {
    let content = read_latin1(path)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    parse_ratings_str(&content, &file_name)
}

/// Parse ratings from already-loaded text
///
/// `file` is only used to give parse errors some context.
pub fn parse_ratings_str(content: &str, file: &str) -> Result<Vec<Rating>> {
    let mut ratings = Vec::new();
    let mut seen_data_line = false;

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }

        let fields = split_fields(line_trimmed);
        if fields.len() < 3 {
            return Err(DataLoadError::FieldCountMismatch {
                expected: 3,
                found: fields.len(),
                line: line_no,
            });
        }

        if !seen_data_line && fields[0].parse::<u32>().is_err() {
            // Header row, e.g. "user_id,joke_id,rating"
            seen_data_line = true;
            continue;
        }
        seen_data_line = true;

        ratings.push(parse_rating_fields(&fields, file, line_no)?);
    }

    Ok(ratings)
}

/// Parse an item catalog from disk
///
/// Format: `itemId::title[::genres]`, `itemId<TAB>title[...]` or
/// `itemId,title[,...]` where a CSV title may be double-quoted.
pub fn parse_titles(path: &Path) -> Result<ItemTitles> {
    let content = read_latin1(path)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    parse_titles_str(&content, &file_name)
}

/// Parse an item catalog from already-loaded text
///
/// Every entry must fit on one line. A later line for the same item
/// replaces an earlier one.
pub fn parse_titles_str(content: &str, file: &str) -> Result<ItemTitles> {
    let mut titles = ItemTitles::new();
    let mut seen_data_line = false;

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }

        let parse_error = |reason: String| DataLoadError::ParseError {
            file: file.to_string(),
            line: line_no,
            reason,
        };

        let (raw_id, title) = split_title_line(line_trimmed).ok_or(
            DataLoadError::FieldCountMismatch {
                expected: 2,
                found: 1,
                line: line_no,
            },
        )?;

        let item_id: ItemId = match raw_id.trim().parse() {
            Ok(id) => id,
            Err(_) if !seen_data_line => {
                // Header row, e.g. "movieId,title,genres"
                seen_data_line = true;
                continue;
            }
            Err(e) => return Err(parse_error(format!("Invalid itemId: {}", e))),
        };
        seen_data_line = true;

        let title = title.trim();
        if title.is_empty() {
            return Err(parse_error("Missing title".to_string()));
        }
        titles.insert(item_id, title.to_string());
    }

    Ok(titles)
}

/// Id field and title of a catalog line, or `None` without a separator
fn split_title_line(line: &str) -> Option<(&str, String)> {
    if let Some((id, rest)) = line.split_once("::") {
        let title = rest.split("::").next().unwrap_or_default();
        return Some((id, title.to_string()));
    }
    if let Some((id, rest)) = line.split_once('\t') {
        let title = rest.split('\t').next().unwrap_or_default();
        return Some((id, title.to_string()));
    }
    let (id, rest) = line.split_once(',')?;
    Some((id, first_csv_field(rest.trim_start())))
}

/// First field of a CSV remainder, honoring `"..."` quoting with `""` escapes
fn first_csv_field(rest: &str) -> String {
    let Some(quoted) = rest.strip_prefix('"') else {
        return rest.split(',').next().unwrap_or_default().to_string();
    };

    let mut field = String::new();
    let mut chars = quoted.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                field.push('"');
            } else {
                break;
            }
        } else {
            field.push(c);
        }
    }
    field
}

/// Split a line on `::`, then tab, then comma, whichever occurs first
fn split_fields(line: &str) -> Vec<&str> {
    let fields: Vec<&str> = if line.contains("::") {
        line.split("::").collect()
    } else if line.contains('\t') {
        line.split('\t').collect()
    } else {
        line.split(',').collect()
    };
    fields.into_iter().map(str::trim).collect()
}

fn parse_rating_fields(fields: &[&str], file: &str, line_no: usize) -> Result<Rating> {
    let parse_error = |reason: String| DataLoadError::ParseError {
        file: file.to_string(),
        line: line_no,
        reason,
    };

    let user_id = fields[0]
        .parse()
        .map_err(|e| parse_error(format!("Invalid userId: {}", e)))?;
    let item_id = fields[1]
        .parse()
        .map_err(|e| parse_error(format!("Invalid itemId: {}", e)))?;
    let rating: f32 = fields[2]
        .parse()
        .map_err(|e| parse_error(format!("Invalid rating: {}", e)))?;

    if !rating.is_finite() {
        return Err(DataLoadError::InvalidValue {
            field: "rating".to_string(),
            value: fields[2].to_string(),
        });
    }

    let timestamp = match fields.get(3) {
        Some(raw) if !raw.is_empty() => Some(
            raw.parse()
                .map_err(|e| parse_error(format!("Invalid timestamp: {}", e)))?,
        ),
        _ => None,
    };

    Ok(Rating {
        user_id,
        item_id,
        rating,
        timestamp,
    })
}
