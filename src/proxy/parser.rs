//! Proxy parser module for parsing proxy lists from pages and files

use crate::error::PersistenceError;
use crate::proxy::models::ProxyAddress;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Regex pattern to match IP:PORT patterns in text
static IP_PORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5})\b")
        .expect("Invalid IP:PORT regex")
});

static PROXY_TABLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table#proxylisttable").expect("Invalid table selector"));

static TABLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("Invalid table selector"));

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("Invalid row selector"));

static CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td").expect("Invalid cell selector"));

/// Proxy parser for parsing proxies from strings, pages and files
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a plain list, one `host:port` per line.
    ///
    /// Falls back to extracting every `a.b.c.d:port` occurrence when no
    /// line parses on its own (e.g. the list is embedded in prose).
    pub fn parse_plain(content: &str) -> Vec<ProxyAddress> {
        let proxies: Vec<ProxyAddress> =
            content.lines().filter_map(ProxyAddress::parse).collect();

        if proxies.is_empty() {
            Self::extract_with_regex(content)
        } else {
            proxies
        }
    }

    /// Parse an HTML proxy table: host in the first cell, port in the second.
    ///
    /// Uses the table with id `proxylisttable` when present, else the first
    /// table on the page. The header row is skipped.
    pub fn parse_table(html: &str) -> Vec<ProxyAddress> {
        let document = Html::parse_document(html);
        let table = document
            .select(&PROXY_TABLE_SELECTOR)
            .next()
            .or_else(|| document.select(&TABLE_SELECTOR).next());

        let Some(table) = table else {
            return Vec::new();
        };

        table
            .select(&ROW_SELECTOR)
            .skip(1)
            .filter_map(|row| {
                let mut cells = row.select(&CELL_SELECTOR);
                let host = cells.next()?.text().collect::<String>();
                let port = cells.next()?.text().collect::<String>();
                ProxyAddress::parse(&format!("{}:{}", host.trim(), port.trim()))
            })
            .collect()
    }

    /// Extract proxies using regex pattern matching
    fn extract_with_regex(content: &str) -> Vec<ProxyAddress> {
        IP_PORT_REGEX
            .captures_iter(content)
            .filter_map(|cap| {
                let host = cap.get(1)?.as_str();
                let port: u16 = cap.get(2)?.as_str().parse().ok()?;

                for part in host.split('.') {
                    let num: u32 = part.parse().ok()?;
                    if num > 255 {
                        return None;
                    }
                }

                if port == 0 {
                    return None;
                }

                Some(ProxyAddress::new(host, port))
            })
            .collect()
    }

    /// Read a newline-delimited proxy file. A missing file is an empty list.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Vec<ProxyAddress>, PersistenceError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Ok(content.lines().filter_map(ProxyAddress::parse).collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(PersistenceError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Overwrite `path` with one `host:port` per line
    pub fn save_to_file<P: AsRef<Path>>(
        proxies: &[ProxyAddress],
        path: P,
    ) -> Result<(), PersistenceError> {
        let path = path.as_ref();
        let mut content = String::new();
        for proxy in proxies {
            content.push_str(&proxy.to_string());
            content.push('\n');
        }

        fs::write(path, content).map_err(|source| PersistenceError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}
