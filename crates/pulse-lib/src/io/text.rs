use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, Trim};
use std::io::Read;
use std::path::Path;

/// Which comma-separated field of each line holds the sample value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SampleColumn {
    /// Last field; covers both bare values and `timestamp,value` rows.
    #[default]
    Last,
    Index(usize),
}

/// Parse one sample per line. Blank lines and `#` comments are skipped, as is a
/// single non-numeric header line at the top.
pub fn parse_samples(text: &str, column: SampleColumn) -> Result<Vec<f64>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_reader(text.as_bytes());
    let mut out = Vec::new();
    let mut header_seen = false;
    for record in reader.records() {
        let record = record.context("reading samples")?;
        let line = record.position().map_or(0, |p| p.line());
        let field = match column {
            SampleColumn::Last => record.iter().last(),
            SampleColumn::Index(i) => record.get(i),
        };
        let Some(field) = field else {
            bail!("line {line}: no column {column:?}");
        };
        match field.parse::<f64>() {
            Ok(v) => out.push(v),
            Err(_) if out.is_empty() && !header_seen => header_seen = true,
            Err(e) => {
                return Err(e).with_context(|| format!("line {line} is not a number: {field}"))
            }
        }
    }
    if out.is_empty() {
        bail!("no numeric samples found");
    }
    Ok(out)
}

/// Read samples from `path`, or from stdin when `path` is `-`.
pub fn read_samples(path: &Path, column: SampleColumn) -> Result<Vec<f64>> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?
    };
    parse_samples(&text, column)
}
