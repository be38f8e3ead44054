//! Compound values: records and tables

use std::sync::Arc;

use indexmap::IndexMap;

use super::{ErrorValue, FormulaType, FormulaValue, RecordType, SINGLE_COLUMN};

/// A record: named fields in declaration order plus the declared type.
///
/// Fields missing from the map read as blank of their declared type, so a
/// record conformed to a wider type never has to materialise the blanks.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordValue {
    ty: RecordType,
    fields: Arc<IndexMap<Arc<str>, FormulaValue>>,
}

impl RecordValue {
    /// Record of the given type with every field blank.
    pub fn new(ty: RecordType) -> Self {
        Self {
            ty,
            fields: Arc::new(IndexMap::new()),
        }
    }

    /// Record whose type is inferred from the field values.
    pub fn from_fields<N: Into<Arc<str>>>(
        fields: impl IntoIterator<Item = (N, FormulaValue)>,
    ) -> Self {
        fields
            .into_iter()
            .fold(Self::new(RecordType::new()), |rec, (name, value)| {
                rec.with_field(name, value)
            })
    }

    /// Add or replace a field, widening the type if needed.
    pub fn with_field(mut self, name: impl Into<Arc<str>>, value: FormulaValue) -> Self {
        let name = name.into();
        if !self.ty.contains(&name) {
            self.ty = self.ty.with_field(name.clone(), value.formula_type());
        }
        Arc::make_mut(&mut self.fields).insert(name, value);
        self
    }

    /// Declared type.
    pub fn ty(&self) -> &RecordType {
        &self.ty
    }

    /// Stored value of a field, `None` when the field is not materialised.
    pub fn get(&self, name: &str) -> Option<&FormulaValue> {
        self.fields.get(name)
    }

    /// Value of a field, falling back to blank of the declared type.
    pub fn field(&self, name: &str) -> FormulaValue {
        match self.fields.get(name) {
            Some(v) => v.clone(),
            None => FormulaValue::Blank(self.ty.get(name).cloned().unwrap_or_default()),
        }
    }

    /// Materialised fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&Arc<str>, &FormulaValue)> {
        self.fields.iter()
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.ty.len()
    }

    /// Whether the record type has no fields.
    pub fn is_empty(&self) -> bool {
        self.ty.is_empty()
    }

    /// Restrict and pad the record to `ty`: declared fields that are
    /// missing become blank of their type, undeclared fields are dropped.
    pub fn conform_to(&self, ty: &RecordType) -> RecordValue {
        if &self.ty == ty {
            return self.clone();
        }
        let fields = ty
            .iter()
            .map(|(name, fty)| {
                let value = match self.fields.get(name) {
                    Some(v) => v.clone().conform_to(fty),
                    None => FormulaValue::Blank(fty.clone()),
                };
                (name.clone(), value)
            })
            .collect();
        RecordValue {
            ty: ty.clone(),
            fields: Arc::new(fields),
        }
    }
}

/// One row of a table.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// A proper row
    Record(RecordValue),
    /// A blank row
    Blank,
    /// A row that failed to evaluate
    Error(ErrorValue),
}

impl RowOutcome {
    /// The row as a value, blank rows typed as `Record(row_type)`.
    pub fn to_value(&self, row_type: &RecordType) -> FormulaValue {
        match self {
            RowOutcome::Record(r) => FormulaValue::Record(r.clone()),
            RowOutcome::Blank => FormulaValue::Blank(FormulaType::Record(row_type.clone())),
            RowOutcome::Error(e) => FormulaValue::Error(e.clone()),
        }
    }
}

/// An ordered sequence of rows sharing one declared row type.
#[derive(Debug, Clone, PartialEq)]
pub struct TableValue {
    row_type: RecordType,
    rows: Arc<Vec<RowOutcome>>,
}

impl TableValue {
    /// Table of `row_type`. Record rows are conformed to it.
    pub fn new(row_type: RecordType, rows: impl IntoIterator<Item = RowOutcome>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| match row {
                RowOutcome::Record(r) => RowOutcome::Record(r.conform_to(&row_type)),
                other => other,
            })
            .collect();
        Self {
            row_type,
            rows: Arc::new(rows),
        }
    }

    /// Table built from records.
    pub fn from_records(
        row_type: RecordType,
        records: impl IntoIterator<Item = RecordValue>,
    ) -> Self {
        Self::new(row_type, records.into_iter().map(RowOutcome::Record))
    }

    /// Single-column table named `Value`. Error values become error rows.
    pub fn single_column(
        element: FormulaType,
        values: impl IntoIterator<Item = FormulaValue>,
    ) -> Self {
        let row_type = RecordType::new().with_field(SINGLE_COLUMN, element);
        Self::from_column(row_type, values)
    }

    /// Build a table from per-row results.
    ///
    /// Record results become rows as they are. With a multi-column row
    /// type blank results become blank rows; anything else is wrapped into
    /// the single column of `row_type`.
    pub fn from_results(row_type: RecordType, results: Vec<FormulaValue>) -> Self {
        let column = row_type
            .single_column()
            .cloned()
            .unwrap_or_else(|| Arc::from(SINGLE_COLUMN));
        let single = row_type.single_column().is_some();
        let rows: Vec<_> = results
            .into_iter()
            .map(|value| match value {
                FormulaValue::Record(r) => RowOutcome::Record(r),
                FormulaValue::Error(e) => RowOutcome::Error(e),
                FormulaValue::Blank(FormulaType::Record(_)) => RowOutcome::Blank,
                FormulaValue::Blank(_) if !single => RowOutcome::Blank,
                other => RowOutcome::Record(
                    RecordValue::new(row_type.clone()).with_field(column.clone(), other),
                ),
            })
            .collect();
        Self::new(row_type, rows)
    }

    fn from_column(row_type: RecordType, values: impl IntoIterator<Item = FormulaValue>) -> Self {
        let column = row_type
            .single_column()
            .cloned()
            .unwrap_or_else(|| Arc::from(SINGLE_COLUMN));
        let rows: Vec<_> = values
            .into_iter()
            .map(|value| match value {
                FormulaValue::Error(e) => RowOutcome::Error(e),
                other => RowOutcome::Record(
                    RecordValue::new(row_type.clone()).with_field(column.clone(), other),
                ),
            })
            .collect();
        Self::new(row_type, rows)
    }

    /// Declared row type.
    pub fn row_type(&self) -> &RecordType {
        &self.row_type
    }

    /// Rows in order.
    pub fn rows(&self) -> &[RowOutcome] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row `index` as a value.
    pub fn row(&self, index: usize) -> Option<FormulaValue> {
        self.rows.get(index).map(|r| r.to_value(&self.row_type))
    }

    /// Value of the only column of row `index`.
    ///
    /// Blank rows read as blank, error rows as their error.
    pub fn column_value(&self, index: usize) -> Option<FormulaValue> {
        let column = self.row_type.single_column()?;
        let value = match self.rows.get(index)? {
            RowOutcome::Record(r) => r.field(column),
            RowOutcome::Blank => {
                FormulaValue::Blank(self.row_type.get(column).cloned().unwrap_or_default())
            }
            RowOutcome::Error(e) => FormulaValue::Error(e.clone()),
        };
        Some(value)
    }

    /// Errors of all failed rows, in row order.
    pub fn row_errors(&self) -> impl Iterator<Item = &ErrorValue> {
        self.rows.iter().filter_map(|r| match r {
            RowOutcome::Error(e) => Some(e),
            _ => None,
        })
    }

    /// Conform every row to `row_type`.
    pub fn conform_to(&self, row_type: &RecordType) -> TableValue {
        if &self.row_type == row_type {
            return self.clone();
        }
        TableValue::new(row_type.clone(), self.rows.iter().cloned())
    }
}
