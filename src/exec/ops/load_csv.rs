//! CSV row source.

use std::fs::File;

use csv::{ReaderBuilder, StringRecord};

use crate::error::{GraphError, Result};
use crate::exec::expr::Expr;
use crate::exec::record::Record;
use crate::exec::{ExecCtx, ExecutionPlan};
use crate::value::Value;

use super::{OpId, OpKind, Operator};

/// Streams one record per CSV row. With headers enabled each row surfaces
/// as a map from header name to field; without, as an array of fields.
/// The path expression must evaluate to a string naming a readable file;
/// anything else raises a runtime exception.
pub struct LoadCsv {
    children: Vec<OpId>,
    path_expr: Expr,
    with_headers: bool,
    row_slot: usize,
    reader: Option<csv::Reader<File>>,
    headers: Vec<String>,
    child_record: Option<Record>,
}

impl LoadCsv {
    pub fn new(child: Option<OpId>, path_expr: Expr, with_headers: bool, row_slot: usize) -> Self {
        Self {
            children: child.into_iter().collect(),
            path_expr,
            with_headers,
            row_slot,
            reader: None,
            headers: Vec::new(),
            child_record: None,
        }
    }

    /// Evaluates the path expression against `record` and opens a fresh
    /// reader over it.
    fn open_reader(&mut self, record: &Record, ctx: &ExecCtx<'_>) -> Result<()> {
        let path = match self.path_expr.eval(record, ctx)? {
            Value::String(path) => path,
            other => {
                return Err(GraphError::InvalidCsvPath(format!(
                    "path expression evaluated to {}",
                    other.type_name()
                )))
            }
        };
        let file = File::open(&path)
            .map_err(|err| GraphError::InvalidCsvPath(format!("{path}: {err}")))?;
        let mut reader = ReaderBuilder::new()
            .has_headers(self.with_headers)
            .flexible(true)
            .from_reader(file);
        self.headers = if self.with_headers {
            reader
                .headers()?
                .iter()
                .map(str::to_owned)
                .collect()
        } else {
            Vec::new()
        };
        self.reader = Some(reader);
        Ok(())
    }

    fn row_value(&self, row: &StringRecord) -> Value {
        if self.with_headers {
            Value::Map(
                self.headers
                    .iter()
                    .zip(row.iter())
                    .map(|(name, field)| (name.clone(), Value::String(field.to_owned())))
                    .collect(),
            )
        } else {
            Value::Array(row.iter().map(|field| Value::String(field.to_owned())).collect())
        }
    }

    fn next_row(&mut self) -> Result<Option<Value>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut row = StringRecord::new();
        if reader.read_record(&mut row)? {
            Ok(Some(self.row_value(&row)))
        } else {
            Ok(None)
        }
    }
}

impl Operator for LoadCsv {
    fn kind(&self) -> OpKind {
        OpKind::LoadCsv
    }

    fn children(&self) -> &[OpId] {
        &self.children
    }

    fn set_children(&mut self, children: &[OpId]) {
        self.children = children.to_vec();
    }

    fn modifies(&self) -> Vec<usize> {
        vec![self.row_slot]
    }

    fn init(&mut self, ctx: &mut ExecCtx<'_>) -> Result<()> {
        if self.children.is_empty() {
            // constant path: open once up front
            let record = ctx.new_record();
            self.open_reader(&record, ctx)?;
        }
        Ok(())
    }

    fn consume(
        &mut self,
        plan: &mut ExecutionPlan,
        ctx: &mut ExecCtx<'_>,
    ) -> Result<Option<Record>> {
        if self.children.is_empty() {
            if self.reader.is_none() {
                // reopened after a reset
                let record = ctx.new_record();
                self.open_reader(&record, ctx)?;
            }
            return match self.next_row()? {
                Some(value) => {
                    let mut record = ctx.new_record();
                    record.set_scalar(self.row_slot, value);
                    Ok(Some(record))
                }
                None => Ok(None),
            };
        }

        let child = self.children[0];
        loop {
            if self.child_record.is_some() {
                if let Some(value) = self.next_row()? {
                    let mut record = self
                        .child_record
                        .as_ref()
                        .map(Record::clone)
                        .unwrap_or_else(|| ctx.new_record());
                    record.set_scalar(self.row_slot, value);
                    return Ok(Some(record));
                }
            }

            self.child_record = plan.pull(child, ctx)?;
            let Some(record) = self.child_record.clone() else {
                return Ok(None);
            };
            self.open_reader(&record, ctx)?;
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.reader = None;
        self.child_record = None;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(LoadCsv::new(
            None,
            self.path_expr.clone(),
            self.with_headers,
            self.row_slot,
        ))
    }
}
