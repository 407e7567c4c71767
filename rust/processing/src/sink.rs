// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persistent store interface and batched writes.
//!
//! The pipeline never talks to a database directly. It hands records to a
//! [`RecordSink`] through a [`BatchWriter`], which buffers them up to the
//! configured flush threshold, writes and commits each batch and applies the
//! failure policy:
//!
//! - face batches failing with [`StoreError::Recoverable`] are dropped and a
//!   diagnostic is recorded,
//! - index batches failing with [`StoreError::Recoverable`] are kept and
//!   retried once at the next batch boundary, then dropped,
//! - [`StoreError::Fatal`] is returned to the caller.

use std::collections::VecDeque;

use bimdex_spatial::IndexRow;
use rustc_hash::FxHashMap;

use crate::config::IndexSelection;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::StoreError;
use crate::records::{ElementUpdate, FaceRecord, IndexFrame};
use crate::Result;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Destination of everything a model pass produces.
pub trait RecordSink {
    fn write_faces(&mut self, records: &[FaceRecord]) -> StoreResult<()>;

    fn write_index_rows(&mut self, rows: &[IndexRow]) -> StoreResult<()>;

    fn update_element(&mut self, update: &ElementUpdate) -> StoreResult<()>;

    /// Index rows currently stored, used to seed partial regeneration.
    fn existing_index_rows(&mut self) -> StoreResult<Vec<IndexRow>>;

    /// Frame the stored index rows were written with, if any.
    fn index_frame(&mut self) -> StoreResult<Option<IndexFrame>>;

    /// Records the frame of a rebuilt index.
    fn store_index_frame(&mut self, frame: &IndexFrame) -> StoreResult<()>;

    /// Removes the stored index rows of the selected elements.
    fn clear_index(&mut self, selection: &IndexSelection) -> StoreResult<()>;

    fn commit(&mut self) -> StoreResult<()>;
}

/// In-memory store. Failures can be scripted to exercise the batch policy.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub faces: Vec<FaceRecord>,
    pub index_rows: Vec<IndexRow>,
    pub frame: Option<IndexFrame>,
    pub elements: FxHashMap<String, ElementUpdate>,
    pub commits: usize,
    face_failures: VecDeque<StoreError>,
    index_failures: VecDeque<StoreError>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink pre-filled with the index of an earlier pass.
    pub fn with_index(rows: Vec<IndexRow>, frame: IndexFrame) -> Self {
        Self {
            index_rows: rows,
            frame: Some(frame),
            ..Self::default()
        }
    }

    /// Makes the next face batch write fail with `error`.
    pub fn fail_next_face_write(&mut self, error: StoreError) {
        self.face_failures.push_back(error);
    }

    /// Makes the next index batch write fail with `error`.
    pub fn fail_next_index_write(&mut self, error: StoreError) {
        self.index_failures.push_back(error);
    }

    /// Face records of one element, in write order.
    pub fn faces_of<'a>(&'a self, element_id: &'a str) -> impl Iterator<Item = &'a FaceRecord> {
        self.faces.iter().filter(move |f| f.element_id == element_id)
    }
}

impl RecordSink for MemorySink {
    fn write_faces(&mut self, records: &[FaceRecord]) -> StoreResult<()> {
        if let Some(error) = self.face_failures.pop_front() {
            return Err(error);
        }
        self.faces.extend_from_slice(records);
        Ok(())
    }

    fn write_index_rows(&mut self, rows: &[IndexRow]) -> StoreResult<()> {
        if let Some(error) = self.index_failures.pop_front() {
            return Err(error);
        }
        self.index_rows.extend_from_slice(rows);
        Ok(())
    }

    fn update_element(&mut self, update: &ElementUpdate) -> StoreResult<()> {
        self.elements.insert(update.element_id.clone(), update.clone());
        Ok(())
    }

    fn existing_index_rows(&mut self) -> StoreResult<Vec<IndexRow>> {
        Ok(self.index_rows.clone())
    }

    fn index_frame(&mut self) -> StoreResult<Option<IndexFrame>> {
        Ok(self.frame)
    }

    fn store_index_frame(&mut self, frame: &IndexFrame) -> StoreResult<()> {
        self.frame = Some(*frame);
        Ok(())
    }

    fn clear_index(&mut self, selection: &IndexSelection) -> StoreResult<()> {
        self.index_rows.retain(|row| !selection.includes(&row.element_id));
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.commits += 1;
        Ok(())
    }
}

/// Buffers records in front of a [`RecordSink`].
pub struct BatchWriter<'a, S: RecordSink + ?Sized> {
    sink: &'a mut S,
    face_batch_size: usize,
    index_batch_size: usize,
    faces: Vec<FaceRecord>,
    rows: Vec<IndexRow>,
    retry: Option<Vec<IndexRow>>,
    faces_written: usize,
    rows_written: usize,
    diagnostics: Diagnostics,
}

impl<'a, S: RecordSink + ?Sized> BatchWriter<'a, S> {
    pub fn new(sink: &'a mut S, face_batch_size: usize, index_batch_size: usize) -> Self {
        Self {
            sink,
            face_batch_size: face_batch_size.max(1),
            index_batch_size: index_batch_size.max(1),
            faces: Vec::with_capacity(face_batch_size.max(1)),
            rows: Vec::with_capacity(index_batch_size.max(1)),
            retry: None,
            faces_written: 0,
            rows_written: 0,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn sink(&mut self) -> &mut S {
        &mut *self.sink
    }

    pub fn push_face(&mut self, record: FaceRecord) -> Result<()> {
        self.faces.push(record);
        if self.faces.len() >= self.face_batch_size {
            self.flush_faces()?;
        }
        Ok(())
    }

    pub fn push_row(&mut self, row: IndexRow) -> Result<()> {
        self.rows.push(row);
        if self.rows.len() >= self.index_batch_size {
            self.flush_rows()?;
        }
        Ok(())
    }

    /// Sends an element update straight to the sink.
    pub fn update_element(&mut self, update: &ElementUpdate) -> Result<()> {
        match self.sink.update_element(update) {
            Ok(()) => Ok(()),
            Err(StoreError::Recoverable(message)) => {
                self.diagnostics.push(
                    Some(update.element_id.as_str()),
                    DiagnosticKind::StoreRecoverable,
                    format!("element update failed: {}", message),
                );
                Ok(())
            }
            Err(fatal) => Err(fatal.into()),
        }
    }

    pub fn flush_faces(&mut self) -> Result<()> {
        if self.faces.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.faces);
        match write_and_commit(&mut *self.sink, |sink| sink.write_faces(&batch)) {
            Ok(()) => {
                self.faces_written += batch.len();
                tracing::debug!(records = batch.len(), "Wrote face batch");
            }
            Err(StoreError::Recoverable(message)) => {
                self.diagnostics.push(
                    None,
                    DiagnosticKind::StoreRecoverable,
                    format!("dropped batch of {} face records: {}", batch.len(), message),
                );
            }
            Err(fatal) => return Err(fatal.into()),
        }
        Ok(())
    }

    /// Writes the buffered index rows, retrying the previously failed batch
    /// first.
    pub fn flush_rows(&mut self) -> Result<()> {
        if let Some(pending) = self.retry.take() {
            match write_and_commit(&mut *self.sink, |sink| sink.write_index_rows(&pending)) {
                Ok(()) => {
                    self.rows_written += pending.len();
                    tracing::debug!(rows = pending.len(), "Retried index batch");
                }
                Err(StoreError::Recoverable(message)) => {
                    self.diagnostics.push(
                        None,
                        DiagnosticKind::StoreRecoverable,
                        format!("dropped batch of {} index rows after retry: {}", pending.len(), message),
                    );
                }
                Err(fatal) => return Err(fatal.into()),
            }
        }

        if self.rows.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.rows);
        match write_and_commit(&mut *self.sink, |sink| sink.write_index_rows(&batch)) {
            Ok(()) => {
                self.rows_written += batch.len();
                tracing::debug!(rows = batch.len(), "Wrote index batch");
            }
            Err(StoreError::Recoverable(message)) => {
                self.diagnostics.push(
                    None,
                    DiagnosticKind::StoreRecoverable,
                    format!("index batch of {} rows failed, will retry: {}", batch.len(), message),
                );
                self.retry = Some(batch);
            }
            Err(fatal) => return Err(fatal.into()),
        }
        Ok(())
    }

    /// Flushes both buffers, giving a failed index batch its retry.
    pub fn finish(&mut self) -> Result<()> {
        self.flush_faces()?;
        self.flush_rows()?;
        if self.retry.is_some() {
            self.flush_rows()?;
        }
        Ok(())
    }

    pub fn faces_written(&self) -> usize {
        self.faces_written
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }
}

fn write_and_commit<S, F>(sink: &mut S, write: F) -> StoreResult<()>
where
    S: RecordSink + ?Sized,
    F: FnOnce(&mut S) -> StoreResult<()>,
{
    write(sink)?;
    sink.commit()
}
