//! Reference engine for `.msch` schematic payloads.
//!
//! Layout: `b"msch"`, a version byte, then a zlib stream holding
//! `u16 width, u16 height, u8 tag_count` followed by `tag_count` key/value
//! pairs, each a `u16` length-prefixed string. Everything after the tag
//! table (block palette and tiles) is left untouched.

#![forbid(unsafe_code)]

use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use flate2::read::ZlibDecoder;
use smallvec::SmallVec;
use tracing::info;
use vitrine_core::{Engine, ImageRef, Initializer, ItemMeta, VitrineError, VitrineResult};

pub const MAGIC: &[u8; 4] = b"msch";

/// Header fields decoded from a schematic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub width: u16,
    pub height: u16,
    pub tags: SmallVec<[(String, String); 4]>,
}

impl Header {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

pub fn read_header(raw: &[u8]) -> VitrineResult<Header> {
    let body = raw
        .strip_prefix(MAGIC.as_slice())
        .ok_or_else(|| VitrineError::Tags("missing msch header".into()))?;
    let (&version, compressed) = body
        .split_first()
        .ok_or_else(|| VitrineError::Tags("truncated before version".into()))?;
    let mut r = ZlibDecoder::new(compressed);
    let width = read_u16(&mut r)?;
    let height = read_u16(&mut r)?;
    let count = read_u8(&mut r)?;
    let mut tags = SmallVec::new();
    for _ in 0..count {
        let key = read_utf(&mut r)?;
        let value = read_utf(&mut r)?;
        tags.push((key, value));
    }
    Ok(Header { version, width, height, tags })
}

fn read_exact<R: Read>(r: &mut R, buf: &mut [u8]) -> VitrineResult<()> {
    r.read_exact(buf).map_err(|e| VitrineError::Tags(format!("corrupt schematic body: {e}")))
}

fn read_u8<R: Read>(r: &mut R) -> VitrineResult<u8> {
    let mut b = [0u8; 1];
    read_exact(r, &mut b)?;
    Ok(b[0])
}

fn read_u16<R: Read>(r: &mut R) -> VitrineResult<u16> {
    let mut b = [0u8; 2];
    read_exact(r, &mut b)?;
    Ok(u16::from_be_bytes(b))
}

fn read_utf<R: Read>(r: &mut R) -> VitrineResult<String> {
    let len = read_u16(r)? as usize;
    let mut buf = vec![0u8; len];
    read_exact(r, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Strip `[color]` markup from in-game names.
pub fn strip_colors(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        if let Some(stripped) = after.strip_prefix('[') {
            // "[[" escapes a literal bracket
            out.push('[');
            rest = stripped;
            continue;
        }
        match after.find(']') {
            Some(close) => rest = &after[close + 1..],
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Default)]
pub struct MschEngine;

impl Engine for MschEngine {
    fn extract_tags(&self, raw: &[u8]) -> VitrineResult<ItemMeta> {
        let h = read_header(raw)?;
        Ok(ItemMeta {
            name: strip_colors(h.tag("name").unwrap_or_default()),
            description: strip_colors(h.tag("description").unwrap_or_default()),
        })
    }

    /// SVG footprint preview, fitted into a 120px tile.
    fn render(&self, raw: &[u8]) -> VitrineResult<ImageRef> {
        let h = read_header(raw).map_err(|e| VitrineError::Render(e.to_string()))?;
        let (w, ht) = (h.width.max(1) as u32, h.height.max(1) as u32);
        let scale = TILE_PX / f64::from(w.max(ht));
        let title = escape_xml(&strip_colors(h.tag("name").unwrap_or_default()));
        let mut svg = format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{pw}" height="{ph}" viewBox="0 0 {w} {ht}"><title>{title}</title><rect width="{w}" height="{ht}" fill="#020202"/>"##,
            pw = fit(w, scale),
            ph = fit(ht, scale),
        );
        for x in 1..w {
            svg.push_str(&format!(r##"<line x1="{x}" y1="0" x2="{x}" y2="{ht}" stroke="#454545" stroke-width="0.05"/>"##));
        }
        for y in 1..ht {
            svg.push_str(&format!(r##"<line x1="0" y1="{y}" x2="{w}" y2="{y}" stroke="#454545" stroke-width="0.05"/>"##));
        }
        svg.push_str("</svg>");
        Ok(ImageRef::Inline { mime: "image/svg+xml".into(), data: Bytes::from(svg) })
    }
}

const TILE_PX: f64 = 120.0;

/// Scaled edge in whole pixels, never collapsing to zero.
fn fit(edge: u32, scale: f64) -> u32 {
    ((f64::from(edge) * scale).round() as u32).max(1)
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

/// Builds the engine, optionally after a warm-up delay standing in for a
/// slow runtime load.
#[derive(Debug, Default, Clone)]
pub struct MschInit {
    pub warmup: Duration,
}

#[async_trait::async_trait]
impl Initializer for MschInit {
    async fn initialize(&self) -> VitrineResult<Arc<dyn Engine>> {
        let t0 = Instant::now();
        if !self.warmup.is_zero() {
            tokio::time::sleep(self.warmup).await;
        }
        info!(took_ms = %t0.elapsed().as_millis(), "msch engine ready");
        Ok(Arc::new(MschEngine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn utf(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(&(s.len() as u16).to_be_bytes());
        out.extend_from_slice(s.as_bytes());
    }

    fn schematic(w: u16, h: u16, tags: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&w.to_be_bytes());
        body.extend_from_slice(&h.to_be_bytes());
        body.push(tags.len() as u8);
        for (k, v) in tags {
            utf(&mut body, k);
            utf(&mut body, v);
        }
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&body).unwrap();
        let mut out = MAGIC.to_vec();
        out.push(1);
        out.extend(enc.finish().unwrap());
        out
    }

    #[test]
    fn extracts_name_and_description() {
        let raw = schematic(3, 2, &[("name", "[accent]Silicon[] smelter"), ("description", "4 in, 1 out"), ("labels", "[]")]);
        let meta = MschEngine.extract_tags(&raw).expect("tags");
        assert_eq!(meta.name, "Silicon smelter");
        assert_eq!(meta.description, "4 in, 1 out");
        let h = read_header(&raw).expect("header");
        assert_eq!((h.version, h.width, h.height), (1, 3, 2));
        assert_eq!(h.tag("labels"), Some("[]"));
    }

    #[test]
    fn missing_tags_default_to_empty() {
        let raw = schematic(1, 1, &[]);
        assert_eq!(MschEngine.extract_tags(&raw).expect("tags"), ItemMeta::default());
    }

    #[test]
    fn rejects_foreign_and_truncated_payloads() {
        assert!(matches!(MschEngine.extract_tags(b"PK\x03\x04"), Err(VitrineError::Tags(_))));
        assert!(matches!(MschEngine.extract_tags(b"msch"), Err(VitrineError::Tags(_))));
        assert!(matches!(MschEngine.render(b"msch\x01garbage"), Err(VitrineError::Render(_))));
    }

    #[test]
    fn renders_svg_fitted_to_tile() {
        let raw = schematic(4, 2, &[("name", "a<b")]);
        let img = MschEngine.render(&raw).expect("render");
        assert_eq!(img.extension(), "svg");
        let ImageRef::Inline { data, .. } = img else { panic!("inline image expected") };
        let svg = std::str::from_utf8(&data).expect("utf8");
        assert!(svg.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg" width="120" height="60""#));
        assert!(svg.contains("<title>a&lt;b</title>"));
    }

    #[test]
    fn large_schematics_shrink_into_the_tile() {
        let raw = schematic(200, 10, &[]);
        let ImageRef::Inline { data, .. } = MschEngine.render(&raw).expect("render") else {
            panic!("inline image expected")
        };
        let svg = std::str::from_utf8(&data).expect("utf8");
        assert!(svg.contains(r#"width="120" height="6" viewBox="0 0 200 10""#), "{svg}");

        let raw = schematic(1, 500, &[]);
        let ImageRef::Inline { data, .. } = MschEngine.render(&raw).expect("render") else {
            panic!("inline image expected")
        };
        assert!(std::str::from_utf8(&data).expect("utf8").contains(r#"width="1" height="120""#));
    }

    #[test]
    fn strip_colors_handles_escapes_and_unclosed() {
        assert_eq!(strip_colors("[red]hot[] [[x]"), "hot [x]");
        assert_eq!(strip_colors("open [bracket"), "open [bracket");
    }

    #[tokio::test]
    async fn initializer_yields_working_engine() {
        let engine = MschInit::default().initialize().await.expect("init");
        let raw = schematic(1, 1, &[("name", "x")]);
        assert_eq!(engine.extract_tags(&raw).expect("tags").name, "x");
    }
}
