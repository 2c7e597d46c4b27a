//! DocValues for columnar storage
//!
//! typed column stores with:
//! - numeric: per-block min/max skip data, values delta coded from the column min
//! - boolean: roaring bitmap of true values
//! - keyword: dictionary encoded ordinals
//! - nulls: explicit bitmap
//!
//! Columns are append-only in docno order. A document without a value for a
//! field gets a null in that field's column.

use std::collections::{BTreeMap, HashMap};
use std::io;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use super::codec::{
    decode_vbyte, decode_vbyte_u64, encode_vbyte, encode_vbyte_u64, read_bitmap, read_i64,
    read_string, read_u8, write_bitmap, write_bytes, write_i64,
};
use super::types::DocNo;

/// Number of docs covered by one numeric skip block
pub const BLOCK_SIZE: usize = 128;

/// Column kinds for doc values
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Boolean,
    Keyword,
}

impl ColumnKind {
    fn tag(self) -> u8 {
        match self {
            ColumnKind::Numeric => 0,
            ColumnKind::Boolean => 1,
            ColumnKind::Keyword => 2,
        }
    }

    fn from_tag(tag: u8) -> io::Result<Self> {
        match tag {
            0 => Ok(ColumnKind::Numeric),
            1 => Ok(ColumnKind::Boolean),
            2 => Ok(ColumnKind::Keyword),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Unknown column type",
            )),
        }
    }
}

/// A single doc value
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnValue {
    Numeric(i64),
    Boolean(bool),
    Keyword(String),
}

impl ColumnValue {
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnValue::Numeric(_) => ColumnKind::Numeric,
            ColumnValue::Boolean(_) => ColumnKind::Boolean,
            ColumnValue::Keyword(_) => ColumnKind::Keyword,
        }
    }
}

/// Map an f64 onto an i64 whose ordering matches the float ordering
pub fn f64_to_sortable_i64(value: f64) -> i64 {
    let bits = value.to_bits() as i64;
    bits ^ ((bits >> 63) & 0x7fff_ffff_ffff_ffff)
}

/// Inverse of [`f64_to_sortable_i64`]
pub fn sortable_i64_to_f64(value: i64) -> f64 {
    let bits = value ^ ((value >> 63) & 0x7fff_ffff_ffff_ffff);
    f64::from_bits(bits as u64)
}

/// Min/max of the non-null values in one block
#[derive(Clone, Copy, Debug, PartialEq)]
struct BlockBounds {
    min: i64,
    max: i64,
}

/// Numeric column with block skip metadata
#[derive(Clone, Debug, Default)]
pub struct NumericColumn {
    /// Values indexed by docno (None for missing values)
    values: Vec<Option<i64>>,
    /// Per-block min/max, None for blocks holding only nulls
    blocks: Vec<Option<BlockBounds>>,
    nulls: RoaringBitmap,
    min_value: Option<i64>,
    max_value: Option<i64>,
}

impl NumericColumn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value for the next docno
    pub fn push(&mut self, value: Option<i64>) {
        let docno = self.values.len();
        if docno % BLOCK_SIZE == 0 {
            self.blocks.push(None);
        }

        match value {
            Some(v) => {
                self.min_value = Some(self.min_value.map_or(v, |m| m.min(v)));
                self.max_value = Some(self.max_value.map_or(v, |m| m.max(v)));
                if let Some(block) = self.blocks.last_mut() {
                    *block = Some(match *block {
                        Some(b) => BlockBounds {
                            min: b.min.min(v),
                            max: b.max.max(v),
                        },
                        None => BlockBounds { min: v, max: v },
                    });
                }
            }
            None => {
                self.nulls.insert(docno as u32);
            }
        }

        self.values.push(value);
    }

    pub fn get(&self, docno: DocNo) -> Option<i64> {
        self.values.get(docno.as_usize()).copied().flatten()
    }

    /// Get documents with value in `[min, max]`, skipping blocks whose
    /// bounds cannot match
    pub fn range_query(&self, min: i64, max: i64) -> RoaringBitmap {
        let mut result = RoaringBitmap::new();
        if min > max {
            return result;
        }
        match (self.min_value, self.max_value) {
            (Some(lo), Some(hi)) if lo <= max && hi >= min => {}
            _ => return result,
        }

        for (block_idx, bounds) in self.blocks.iter().enumerate() {
            let Some(bounds) = bounds else { continue };
            if bounds.max < min || bounds.min > max {
                continue;
            }

            let start = block_idx * BLOCK_SIZE;
            let end = (start + BLOCK_SIZE).min(self.values.len());
            let contained = bounds.min >= min && bounds.max <= max;
            for (offset, value) in self.values[start..end].iter().enumerate() {
                if let Some(v) = value {
                    if contained || (*v >= min && *v <= max) {
                        result.insert((start + offset) as u32);
                    }
                }
            }
        }
        result
    }

    fn serialize_into(&self, output: &mut Vec<u8>) -> io::Result<()> {
        encode_vbyte(self.values.len() as u32, output);
        write_bitmap(&self.nulls, output)?;

        match self.min_value {
            Some(min) => {
                output.push(1);
                write_i64(min, output);
                for v in self.values.iter().flatten() {
                    encode_vbyte_u64(v.wrapping_sub(min) as u64, output);
                }
            }
            None => output.push(0),
        }
        Ok(())
    }

    fn deserialize(data: &[u8], pos: &mut usize) -> io::Result<Self> {
        let count = decode_vbyte(data, pos)? as usize;
        let nulls = read_bitmap(data, pos)?;

        let mut column = NumericColumn::new();
        if read_u8(data, pos)? == 1 {
            let min = read_i64(data, pos)?;
            for docno in 0..count {
                if nulls.contains(docno as u32) {
                    column.push(None);
                } else {
                    let delta = decode_vbyte_u64(data, pos)?;
                    column.push(Some(min.wrapping_add(delta as i64)));
                }
            }
        } else {
            for _ in 0..count {
                column.push(None);
            }
        }
        Ok(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Boolean column using roaring bitmaps
#[derive(Clone, Debug, Default)]
pub struct BooleanColumn {
    true_values: RoaringBitmap,
    nulls: RoaringBitmap,
    doc_count: u32,
}

impl BooleanColumn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value for the next docno
    pub fn push(&mut self, value: Option<bool>) {
        let docno = self.doc_count;
        match value {
            Some(true) => {
                self.true_values.insert(docno);
            }
            // False is implicit (not in true_values, not in nulls)
            Some(false) => {}
            None => {
                self.nulls.insert(docno);
            }
        }
        self.doc_count += 1;
    }

    pub fn get(&self, docno: DocNo) -> Option<bool> {
        if docno.as_u32() >= self.doc_count || self.nulls.contains(docno.as_u32()) {
            None
        } else {
            Some(self.true_values.contains(docno.as_u32()))
        }
    }

    /// Documents holding `value`
    pub fn equals_query(&self, value: bool) -> RoaringBitmap {
        if value {
            self.true_values.clone()
        } else {
            let mut all = RoaringBitmap::new();
            all.insert_range(0..self.doc_count);
            &(&all - &self.nulls) - &self.true_values
        }
    }

    fn serialize_into(&self, output: &mut Vec<u8>) -> io::Result<()> {
        encode_vbyte(self.doc_count, output);
        write_bitmap(&self.true_values, output)?;
        write_bitmap(&self.nulls, output)
    }

    fn deserialize(data: &[u8], pos: &mut usize) -> io::Result<Self> {
        let doc_count = decode_vbyte(data, pos)?;
        let true_values = read_bitmap(data, pos)?;
        let nulls = read_bitmap(data, pos)?;
        Ok(Self {
            true_values,
            nulls,
            doc_count,
        })
    }

    pub fn len(&self) -> usize {
        self.doc_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }
}

/// Keyword column with dictionary encoding
#[derive(Clone, Debug, Default)]
pub struct KeywordColumn {
    /// ordinal -> keyword
    dictionary: Vec<String>,
    keyword_to_ordinal: HashMap<String, u32>,
    /// Ordinals indexed by docno
    ordinals: Vec<Option<u32>>,
}

impl KeywordColumn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value for the next docno
    pub fn push(&mut self, value: Option<&str>) {
        let ordinal = value.map(|keyword| match self.keyword_to_ordinal.get(keyword) {
            Some(&ord) => ord,
            None => {
                let ord = self.dictionary.len() as u32;
                self.dictionary.push(keyword.to_string());
                self.keyword_to_ordinal.insert(keyword.to_string(), ord);
                ord
            }
        });
        self.ordinals.push(ordinal);
    }

    pub fn get(&self, docno: DocNo) -> Option<&str> {
        self.ordinals
            .get(docno.as_usize())
            .copied()
            .flatten()
            .and_then(|ord| self.dictionary.get(ord as usize))
            .map(|s| s.as_str())
    }

    /// Documents holding exactly `keyword`
    pub fn equals_query(&self, keyword: &str) -> RoaringBitmap {
        let mut result = RoaringBitmap::new();
        if let Some(&ordinal) = self.keyword_to_ordinal.get(keyword) {
            for (docno, ord) in self.ordinals.iter().enumerate() {
                if *ord == Some(ordinal) {
                    result.insert(docno as u32);
                }
            }
        }
        result
    }

    fn serialize_into(&self, output: &mut Vec<u8>) -> io::Result<()> {
        encode_vbyte(self.dictionary.len() as u32, output);
        for keyword in &self.dictionary {
            write_bytes(keyword.as_bytes(), output);
        }

        // 0 for nulls, ordinal + 1 otherwise
        encode_vbyte(self.ordinals.len() as u32, output);
        for ord in &self.ordinals {
            encode_vbyte(ord.map_or(0, |o| o + 1), output);
        }
        Ok(())
    }

    fn deserialize(data: &[u8], pos: &mut usize) -> io::Result<Self> {
        let dict_len = decode_vbyte(data, pos)? as usize;
        let mut dictionary = Vec::with_capacity(dict_len);
        let mut keyword_to_ordinal = HashMap::with_capacity(dict_len);
        for ord in 0..dict_len {
            let keyword = read_string(data, pos)?;
            keyword_to_ordinal.insert(keyword.clone(), ord as u32);
            dictionary.push(keyword);
        }

        let doc_count = decode_vbyte(data, pos)? as usize;
        let mut ordinals = Vec::with_capacity(doc_count);
        for _ in 0..doc_count {
            let encoded = decode_vbyte(data, pos)?;
            if encoded as usize > dict_len {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Keyword ordinal out of range",
                ));
            }
            ordinals.push(encoded.checked_sub(1));
        }

        Ok(Self {
            dictionary,
            keyword_to_ordinal,
            ordinals,
        })
    }

    pub fn len(&self) -> usize {
        self.ordinals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }
}

/// A typed doc values column
#[derive(Clone, Debug)]
pub enum Column {
    Numeric(NumericColumn),
    Boolean(BooleanColumn),
    Keyword(KeywordColumn),
}

impl Column {
    pub fn new(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Numeric => Column::Numeric(NumericColumn::new()),
            ColumnKind::Boolean => Column::Boolean(BooleanColumn::new()),
            ColumnKind::Keyword => Column::Keyword(KeywordColumn::new()),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Numeric(_) => ColumnKind::Numeric,
            Column::Boolean(_) => ColumnKind::Boolean,
            Column::Keyword(_) => ColumnKind::Keyword,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(c) => c.len(),
            Column::Boolean(c) => c.len(),
            Column::Keyword(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push_null(&mut self) {
        match self {
            Column::Numeric(c) => c.push(None),
            Column::Boolean(c) => c.push(None),
            Column::Keyword(c) => c.push(None),
        }
    }

    /// Pad with nulls up to `len` docs
    pub fn pad_to(&mut self, len: usize) {
        while self.len() < len {
            self.push_null();
        }
    }

    /// Push a value for the next docno. Returns false on a kind mismatch.
    fn push(&mut self, value: &ColumnValue) -> bool {
        match (self, value) {
            (Column::Numeric(c), ColumnValue::Numeric(v)) => c.push(Some(*v)),
            (Column::Boolean(c), ColumnValue::Boolean(v)) => c.push(Some(*v)),
            (Column::Keyword(c), ColumnValue::Keyword(v)) => c.push(Some(v.as_str())),
            _ => return false,
        }
        true
    }

    pub fn get(&self, docno: DocNo) -> Option<ColumnValue> {
        match self {
            Column::Numeric(c) => c.get(docno).map(ColumnValue::Numeric),
            Column::Boolean(c) => c.get(docno).map(ColumnValue::Boolean),
            Column::Keyword(c) => c.get(docno).map(|s| ColumnValue::Keyword(s.to_string())),
        }
    }

    /// Inclusive range lookup; only numeric columns support it
    pub fn range_query(&self, min: i64, max: i64) -> Option<RoaringBitmap> {
        match self {
            Column::Numeric(c) => Some(c.range_query(min, max)),
            _ => None,
        }
    }

    /// Exact value lookup
    pub fn equals_query(&self, value: &ColumnValue) -> RoaringBitmap {
        match (self, value) {
            (Column::Numeric(c), ColumnValue::Numeric(v)) => c.range_query(*v, *v),
            (Column::Boolean(c), ColumnValue::Boolean(v)) => c.equals_query(*v),
            (Column::Keyword(c), ColumnValue::Keyword(v)) => c.equals_query(v),
            _ => RoaringBitmap::new(),
        }
    }

    fn serialize_into(&self, output: &mut Vec<u8>) -> io::Result<()> {
        output.push(self.kind().tag());
        match self {
            Column::Numeric(c) => c.serialize_into(output),
            Column::Boolean(c) => c.serialize_into(output),
            Column::Keyword(c) => c.serialize_into(output),
        }
    }

    fn deserialize(data: &[u8], pos: &mut usize) -> io::Result<Self> {
        let column = match ColumnKind::from_tag(read_u8(data, pos)?)? {
            ColumnKind::Numeric => Column::Numeric(NumericColumn::deserialize(data, pos)?),
            ColumnKind::Boolean => Column::Boolean(BooleanColumn::deserialize(data, pos)?),
            ColumnKind::Keyword => Column::Keyword(KeywordColumn::deserialize(data, pos)?),
        };
        Ok(column)
    }
}

/// Error raised when a value does not fit the kind of an existing column
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnKindMismatch {
    pub expected: ColumnKind,
    pub actual: ColumnKind,
}

/// All doc values columns of one segment, keyed by field name
#[derive(Clone, Debug, Default)]
pub struct DocValues {
    columns: BTreeMap<String, Column>,
}

impl DocValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` for `docno` to the field's column, creating the column
    /// on first use and padding skipped docnos with nulls
    pub fn append(
        &mut self,
        field: &str,
        docno: DocNo,
        value: &ColumnValue,
    ) -> Result<(), ColumnKindMismatch> {
        let column = self
            .columns
            .entry(field.to_string())
            .or_insert_with(|| Column::new(value.kind()));

        if column.kind() != value.kind() {
            return Err(ColumnKindMismatch {
                expected: column.kind(),
                actual: value.kind(),
            });
        }

        column.pad_to(docno.as_usize());
        column.push(value);
        Ok(())
    }

    /// Pad every column with nulls to `doc_count` docs
    pub fn finish(&mut self, doc_count: usize) {
        for column in self.columns.values_mut() {
            column.pad_to(doc_count);
        }
    }

    pub fn column(&self, field: &str) -> Option<&Column> {
        self.columns.get(field)
    }

    pub fn get(&self, field: &str, docno: DocNo) -> Option<ColumnValue> {
        self.columns.get(field).and_then(|c| c.get(docno))
    }

    /// Field names with a column, in sorted order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|s| s.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(name, column)| (name.as_str(), column))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Serialize all columns into a single byte stream
    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let mut output = Vec::new();
        encode_vbyte(self.columns.len() as u32, &mut output);
        for (name, column) in &self.columns {
            write_bytes(name.as_bytes(), &mut output);
            column.serialize_into(&mut output)?;
        }
        Ok(output)
    }

    /// Deserialize columns from a byte stream
    pub fn deserialize(data: &[u8]) -> io::Result<Self> {
        let mut pos = 0;
        let count = decode_vbyte(data, &mut pos)? as usize;
        let mut columns = BTreeMap::new();
        for _ in 0..count {
            let name = read_string(data, &mut pos)?;
            let column = Column::deserialize(data, &mut pos)?;
            columns.insert(name, column);
        }
        if pos != data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Trailing bytes after doc values",
            ));
        }
        Ok(Self { columns })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_column() {
        let mut col = NumericColumn::new();
        col.push(Some(100));
        col.push(Some(200));
        col.push(None);
        col.push(Some(150));

        assert_eq!(col.get(DocNo(0)), Some(100));
        assert_eq!(col.get(DocNo(2)), None);
        assert!(col.nulls.contains(2));
        assert_eq!((col.min_value, col.max_value), (Some(100), Some(200)));
        assert_eq!(col.range_query(i64::MIN, i64::MAX).len(), 3);

        let result = col.range_query(100, 160);
        assert_eq!(result.iter().collect::<Vec<_>>(), vec![0, 3]);

        // Inclusive on both bounds
        assert_eq!(col.range_query(200, 200).iter().collect::<Vec<_>>(), vec![1]);
        assert!(col.range_query(201, 300).is_empty());
        assert!(col.range_query(160, 150).is_empty());
    }

    #[test]
    fn test_numeric_block_skipping() {
        let mut col = NumericColumn::new();
        for i in 0..(BLOCK_SIZE as i64 * 3) {
            col.push(Some(i));
        }
        assert_eq!(col.blocks.len(), 3);
        assert_eq!(col.blocks[1], Some(BlockBounds { min: 128, max: 255 }));

        let result = col.range_query(250, 260);
        assert_eq!(result.len(), 11);
        assert!(result.contains(250));
        assert!(result.contains(260));
    }

    #[test]
    fn test_sortable_double_encoding() {
        let values = [-1e300, -2.5, -0.5, 0.0, 0.5, 2.5, 1e300];
        let encoded: Vec<i64> = values.iter().map(|v| f64_to_sortable_i64(*v)).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
        for v in values {
            assert_eq!(sortable_i64_to_f64(f64_to_sortable_i64(v)), v);
        }
    }

    #[test]
    fn test_boolean_column() {
        let mut col = BooleanColumn::new();
        col.push(Some(true));
        col.push(Some(false));
        col.push(None);
        col.push(Some(true));

        assert_eq!(col.get(DocNo(0)), Some(true));
        assert_eq!(col.get(DocNo(1)), Some(false));
        assert_eq!(col.get(DocNo(2)), None);
        assert_eq!(col.get(DocNo(9)), None);
        assert_eq!(col.equals_query(true).iter().collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(col.equals_query(false).iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_keyword_column() {
        let mut col = KeywordColumn::new();
        col.push(Some("apple"));
        col.push(Some("banana"));
        col.push(None);
        col.push(Some("apple"));

        assert_eq!(col.get(DocNo(0)), Some("apple"));
        assert_eq!(col.get(DocNo(2)), None);
        assert_eq!(col.equals_query("apple").iter().collect::<Vec<_>>(), vec![0, 3]);
        assert!(col.equals_query("cherry").is_empty());
        assert_eq!(col.dictionary.len(), 2);
    }

    #[test]
    fn test_doc_values_append_pads_nulls() {
        let mut dv = DocValues::new();
        dv.append("dv_field", DocNo(0), &ColumnValue::Numeric(100))
            .unwrap();
        dv.append("dv_field", DocNo(3), &ColumnValue::Numeric(7))
            .unwrap();
        dv.append("flag", DocNo(1), &ColumnValue::Boolean(true))
            .unwrap();
        dv.finish(5);

        let column = dv.column("dv_field").unwrap();
        assert_eq!(column.len(), 5);
        assert_eq!(column.get(DocNo(1)), None);
        assert_eq!(column.get(DocNo(3)), Some(ColumnValue::Numeric(7)));
        assert_eq!(dv.get("flag", DocNo(0)), None);
        assert_eq!(dv.get("flag", DocNo(1)), Some(ColumnValue::Boolean(true)));
        assert_eq!(dv.fields().collect::<Vec<_>>(), vec!["dv_field", "flag"]);

        let err = dv
            .append("flag", DocNo(2), &ColumnValue::Numeric(1))
            .unwrap_err();
        assert_eq!(err.expected, ColumnKind::Boolean);
    }

    #[test]
    fn test_doc_values_serialization() {
        let mut dv = DocValues::new();
        dv.append("n", DocNo(0), &ColumnValue::Numeric(i64::MIN)).unwrap();
        dv.append("n", DocNo(2), &ColumnValue::Numeric(i64::MAX)).unwrap();
        dv.append("k", DocNo(1), &ColumnValue::Keyword("beta".to_string()))
            .unwrap();
        dv.append("b", DocNo(2), &ColumnValue::Boolean(false)).unwrap();
        dv.finish(3);

        let data = dv.serialize().unwrap();
        let restored = DocValues::deserialize(&data).unwrap();

        assert_eq!(restored.get("n", DocNo(0)), Some(ColumnValue::Numeric(i64::MIN)));
        assert_eq!(restored.get("n", DocNo(1)), None);
        assert_eq!(restored.get("n", DocNo(2)), Some(ColumnValue::Numeric(i64::MAX)));
        assert_eq!(
            restored.get("k", DocNo(1)),
            Some(ColumnValue::Keyword("beta".to_string()))
        );
        assert_eq!(restored.get("b", DocNo(2)), Some(ColumnValue::Boolean(false)));
        assert_eq!(
            restored
                .column("n")
                .and_then(|c| c.range_query(i64::MIN, 0))
                .map(|r| r.len()),
            Some(1)
        );

        assert!(DocValues::deserialize(&data[..data.len() - 1]).is_err());
    }
}
