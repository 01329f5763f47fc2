//! Indicator catalog loaded from a CSV export of the indicator spreadsheet.
//!
//! Each row names one `(code, field)` pair. Rows without a field describe a
//! sparse indicator with the implicit `value` field; rows sharing a code are
//! grouped into one multi-field entry.

use std::{collections::HashMap, io::Read, path::Path};

use serde::Deserialize;

use crate::{
  Error, Result,
  indicator::{DataSource, Field},
};

/// One indicator definition, ready to be registered in a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
  pub code:     String,
  pub category: String,
  pub name:     String,
  pub source:   DataSource,
  pub fields:   Vec<Field>,
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
  #[serde(alias = "wind代码")]
  code:     String,
  #[serde(alias = "指标类别")]
  category: String,
  #[serde(alias = "指标名称")]
  name:     String,
  #[serde(alias = "wind字段", default)]
  field:    Option<String>,
}

/// The static registry of indicators, in spreadsheet order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
  entries: Vec<CatalogEntry>,
}

impl Catalog {
  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let file = std::fs::File::open(path)?;
    Self::from_reader(file)
  }

  pub fn from_reader(reader: impl Read) -> Result<Self> {
    let mut csv = csv::ReaderBuilder::new()
      .trim(csv::Trim::All)
      .flexible(true)
      .from_reader(reader);

    let mut entries: Vec<CatalogEntry> = Vec::new();
    let mut by_code: HashMap<String, usize> = HashMap::new();

    for (idx, row) in csv.deserialize::<CatalogRow>().enumerate() {
      // Header is line 1.
      let line = idx + 2;
      let row = row?;
      if row.code.is_empty() {
        return Err(Error::InvalidRow { row: line, reason: "empty code".into() });
      }

      let field = row.field.filter(|f| !f.is_empty());
      let source = if field.is_some() { DataSource::Dense } else { DataSource::Sparse };
      let field = field.map(Field::new).unwrap_or_else(Field::sparse);

      match by_code.get(&row.code) {
        Some(&i) => {
          let entry = &mut entries[i];
          if entry.source != source {
            return Err(Error::MixedDataSource(row.code));
          }
          if !entry.fields.iter().any(|f| f.name == field.name) {
            entry.fields.push(field);
          }
        }
        None => {
          by_code.insert(row.code.clone(), entries.len());
          entries.push(CatalogEntry {
            code: row.code,
            category: row.category,
            name: row.name,
            source,
            fields: vec![field],
          });
        }
      }
    }

    Ok(Self { entries })
  }

  pub fn entries(&self) -> &[CatalogEntry] { &self.entries }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl IntoIterator for Catalog {
  type Item = CatalogEntry;
  type IntoIter = std::vec::IntoIter<CatalogEntry>;

  fn into_iter(self) -> Self::IntoIter { self.entries.into_iter() }
}
