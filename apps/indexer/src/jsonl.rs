// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON-lines record sink.

use std::io::{BufRead, Write};

use bimdex_processing::{
    ElementUpdate, FaceRecord, IndexFrame, IndexSelection, RecordSink, StoreError, StoreResult,
};
use bimdex_spatial::IndexRow;
use serde::Serialize;

/// One output line.
#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum Line<'a> {
    Face(&'a FaceRecord),
    IndexRow(&'a IndexRow),
    Element(&'a ElementUpdate),
    /// Frame of the index rows that follow.
    IndexFrame(&'a IndexFrame),
    /// Consumers drop the index rows of these elements (all when `None`).
    ClearIndex { elements: Option<Vec<&'a str>> },
}

/// Writes every record as one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    out: W,
    existing: Vec<IndexRow>,
    frame: Option<IndexFrame>,
    lines: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            existing: Vec::new(),
            frame: None,
            lines: 0,
        }
    }

    /// Index of an earlier run, read from JSON lines: bare rows or
    /// `index_row` records, plus the last `index_frame` record of a previous
    /// output.
    pub fn with_existing_index<R: BufRead>(mut self, input: R) -> anyhow::Result<Self> {
        for (n, line) in input.lines().enumerate() {
            let line = line?;
            let value: serde_json::Value = match serde_json::from_str(line.trim()) {
                Ok(value) => value,
                Err(_) if line.trim().is_empty() => continue,
                Err(err) => anyhow::bail!("line {}: {}", n + 1, err),
            };
            match value.get("record").and_then(|r| r.as_str()) {
                None | Some("index_row") => self.existing.push(serde_json::from_value(value)?),
                Some("index_frame") => self.frame = Some(serde_json::from_value(value)?),
                Some(_) => {}
            }
        }
        tracing::debug!(rows = self.existing.len(), frame = ?self.frame, "Loaded existing index");
        Ok(self)
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Serializes the whole batch first and writes it in one call, so that a
    /// failing batch never leaves part of itself in the output.
    fn write_lines<'l, I>(&mut self, lines: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = Line<'l>>,
    {
        let mut buf = Vec::new();
        let mut count = 0;
        for line in lines {
            serde_json::to_writer(&mut buf, &line).map_err(|e| StoreError::Recoverable(e.to_string()))?;
            buf.push(b'\n');
            count += 1;
        }
        self.out.write_all(&buf).map_err(|e| StoreError::Fatal(e.to_string()))?;
        self.lines += count;
        Ok(())
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn write_faces(&mut self, records: &[FaceRecord]) -> StoreResult<()> {
        self.write_lines(records.iter().map(Line::Face))
    }

    fn write_index_rows(&mut self, rows: &[IndexRow]) -> StoreResult<()> {
        self.write_lines(rows.iter().map(Line::IndexRow))
    }

    fn update_element(&mut self, update: &ElementUpdate) -> StoreResult<()> {
        self.write_lines([Line::Element(update)])
    }

    fn existing_index_rows(&mut self) -> StoreResult<Vec<IndexRow>> {
        Ok(self.existing.clone())
    }

    fn index_frame(&mut self) -> StoreResult<Option<IndexFrame>> {
        Ok(self.frame)
    }

    fn store_index_frame(&mut self, frame: &IndexFrame) -> StoreResult<()> {
        self.write_lines([Line::IndexFrame(frame)])
    }

    fn clear_index(&mut self, selection: &IndexSelection) -> StoreResult<()> {
        let elements = match selection {
            IndexSelection::All => None,
            IndexSelection::Elements(ids) => {
                let mut ids: Vec<&str> = ids.iter().map(String::as_str).collect();
                ids.sort_unstable();
                Some(ids)
            }
        };
        self.write_lines([Line::ClearIndex { elements }])
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.out.flush().map_err(|e| StoreError::Fatal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimdex_geometry::{BoundingBox3D, Point3D};
    use bimdex_spatial::CellId;

    #[test]
    fn writes_tagged_lines() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let row = IndexRow::new("A", CellId::ROOT);
        sink.write_index_rows(std::slice::from_ref(&row)).unwrap();
        sink.clear_index(&IndexSelection::elements(["b", "a"])).unwrap();
        sink.commit().unwrap();
        assert_eq!(sink.lines(), 2);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["record"], "index_row");
        assert_eq!(lines[0]["element_id"], "A");
        assert_eq!(lines[1]["record"], "clear_index");
        assert_eq!(lines[1]["elements"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn reads_back_its_own_index() {
        let frame = IndexFrame {
            world: BoundingBox3D::new(Point3D::origin(), Point3D::new(8.0, 8.0, 8.0)),
            max_depth: 4,
        };
        let mut first = JsonLinesSink::new(Vec::new());
        let rows = vec![IndexRow::new("A", CellId::ROOT), IndexRow::new("B", CellId::ROOT)];
        first.clear_index(&IndexSelection::All).unwrap();
        first.store_index_frame(&frame).unwrap();
        first.write_index_rows(&rows).unwrap();
        let output = first.into_inner();

        let mut second = JsonLinesSink::new(Vec::new())
            .with_existing_index(output.as_slice())
            .unwrap();
        assert_eq!(second.existing_index_rows().unwrap(), rows);
        assert_eq!(second.index_frame().unwrap(), Some(frame));
    }

    /// Accepts a write only if all of it fits in the remaining budget.
    struct Budget {
        bytes: Vec<u8>,
        left: usize,
    }

    impl Write for Budget {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if buf.len() > self.left {
                return Err(std::io::Error::other("device full"));
            }
            self.left -= buf.len();
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_batch_leaves_no_partial_lines() {
        let rows: Vec<IndexRow> = (0..3).map(|n| IndexRow::new(format!("E{n}"), CellId::ROOT)).collect();
        let one_line = serde_json::to_vec(&Line::IndexRow(&rows[0])).unwrap().len() + 1;

        let mut sink = JsonLinesSink::new(Budget {
            bytes: Vec::new(),
            left: 2 * one_line,
        });
        let err = sink.write_index_rows(&rows).unwrap_err();
        assert!(!err.is_recoverable());
        assert_eq!(sink.lines(), 0);

        sink.write_index_rows(&rows[..1]).unwrap();
        assert_eq!(sink.lines(), 1);
        let text = String::from_utf8(sink.into_inner().bytes).unwrap();
        let parsed: Vec<IndexRow> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(parsed, rows[..1]);
    }
}
