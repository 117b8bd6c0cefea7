//! 属性表（MalcolmTable）
//!
//! 有序、带类型的列式容器，用于在线上交换结构化属性（datasets 表、detectors 表）。
//!
//! # 不变量
//!
//! - 每一列的长度都等于 `num_rows`
//! - `num_rows` 由数据推导，从不单独设置
//! - 列顺序即插入顺序（线格式对顺序敏感）
//! - 只能追加行；任何违反不变量的构造或追加都整体失败，不会留下部分写入
//!
//! # 并发
//!
//! 不支持并发修改。跨线程传递后，发送方不应再修改它。
//!
//! # 示例
//!
//! ```rust
//! use malcolm_protocol::{CellValue, ColumnType, MalcolmTable};
//!
//! let mut table = MalcolmTable::new([
//!     ("name", ColumnType::String),
//!     ("rank", ColumnType::Integer),
//! ])
//! .unwrap();
//! table.add_row([("name", CellValue::from("det.data")), ("rank", CellValue::from(4i64))]).unwrap();
//! assert_eq!(table.num_rows(), 1);
//! assert_eq!(table.get_row(0).unwrap().get("rank"), Some(&CellValue::Int(4)));
//! ```

use crate::ProtocolError;
use crate::constants::{TABLE_TYPE_ID, TYPE_ID_FIELD};
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::fmt;

// ============================================================================
// 单元格与列类型
// ============================================================================

/// 表格单元值
///
/// 用带标签的联合体代替动态类型，列的声明类型只作为线格式提示。
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl CellValue {
    /// 值的类型名（用于错误信息）
    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Bool(_) => "boolean",
            CellValue::Int(_) => "integer",
            CellValue::Float(_) => "float",
            CellValue::Str(_) => "string",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// 整数也可以按浮点读取
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(f) => Some(*f),
            CellValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Str(s) => Some(s),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            CellValue::Bool(b) => Value::Bool(*b),
            CellValue::Int(i) => Value::from(*i),
            CellValue::Float(f) => Value::from(*f),
            CellValue::Str(s) => Value::String(s.clone()),
        }
    }

    fn from_json(value: &Value, column: &str, ty: ColumnType) -> Result<Self, ProtocolError> {
        let cell = match value {
            Value::Bool(b) => CellValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => CellValue::Int(i),
                None => CellValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => CellValue::Str(s.clone()),
            other => {
                return Err(ProtocolError::Malformed(format!(
                    "column {column} holds a non-scalar cell: {other}"
                )));
            },
        };
        ty.coerce(column, cell)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Float(x) => write!(f, "{x}"),
            CellValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        CellValue::Int(i64::from(v))
    }
}

impl From<u32> for CellValue {
    fn from(v: u32) -> Self {
        CellValue::Int(i64::from(v))
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Str(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Str(v)
    }
}

/// 列的声明类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    String,
}

impl ColumnType {
    /// 把单元值规整为本列类型
    ///
    /// 浮点列接受整数（提升为浮点），其余类型必须严格匹配。
    fn coerce(self, column: &str, value: CellValue) -> Result<CellValue, ProtocolError> {
        match (self, value) {
            (ColumnType::Boolean, v @ CellValue::Bool(_))
            | (ColumnType::Integer, v @ CellValue::Int(_))
            | (ColumnType::Float, v @ CellValue::Float(_))
            | (ColumnType::String, v @ CellValue::Str(_)) => Ok(v),
            (ColumnType::Float, CellValue::Int(i)) => Ok(CellValue::Float(i as f64)),
            (expected, other) => Err(ProtocolError::CellType {
                column: column.to_string(),
                expected,
                actual: other.type_name(),
            }),
        }
    }

    /// 从一列 JSON 值推断列类型（用于无 schema 的反序列化）
    fn infer(values: &[Value]) -> ColumnType {
        if values.is_empty() {
            return ColumnType::String;
        }
        if values.iter().all(Value::is_boolean) {
            ColumnType::Boolean
        } else if values.iter().all(|v| v.is_i64() || v.is_u64()) {
            ColumnType::Integer
        } else if values.iter().all(Value::is_number) {
            ColumnType::Float
        } else {
            ColumnType::String
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::String => "string",
        })
    }
}

/// 按调用方期望的类型读取单元格
pub trait FromCell: Sized {
    /// 期望的列类型
    const COLUMN_TYPE: ColumnType;

    fn from_cell(cell: &CellValue) -> Option<Self>;
}

impl FromCell for bool {
    const COLUMN_TYPE: ColumnType = ColumnType::Boolean;

    fn from_cell(cell: &CellValue) -> Option<Self> {
        cell.as_bool()
    }
}

impl FromCell for i64 {
    const COLUMN_TYPE: ColumnType = ColumnType::Integer;

    fn from_cell(cell: &CellValue) -> Option<Self> {
        cell.as_i64()
    }
}

impl FromCell for f64 {
    const COLUMN_TYPE: ColumnType = ColumnType::Float;

    fn from_cell(cell: &CellValue) -> Option<Self> {
        cell.as_f64()
    }
}

impl FromCell for String {
    const COLUMN_TYPE: ColumnType = ColumnType::String;

    fn from_cell(cell: &CellValue) -> Option<Self> {
        cell.as_str().map(str::to_string)
    }
}

// ============================================================================
// 行
// ============================================================================

/// 行投影：列名 → 该行的值，按列顺序排列
///
/// 按需合成，不在表中存储。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableRow {
    entries: Vec<(String, CellValue)>,
}

impl TableRow {
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.entries.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    /// 按类型读取，类型不符或列不存在时返回 `None`
    pub fn get_as<T: FromCell>(&self, column: &str) -> Option<T> {
        self.get(column).and_then(T::from_cell)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl IntoIterator for TableRow {
    type Item = (String, CellValue);
    type IntoIter = std::vec::IntoIter<(String, CellValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for TableRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

// ============================================================================
// 表
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Column {
    name: String,
    ty: ColumnType,
    values: Vec<CellValue>,
}

/// 列式属性表
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MalcolmTable {
    columns: Vec<Column>,
    num_rows: usize,
}

impl MalcolmTable {
    /// 创建空表
    ///
    /// # 错误
    ///
    /// 列名重复时返回 [`ProtocolError::SchemaMismatch`]。
    pub fn new<I, S>(column_types: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        let mut columns: Vec<Column> = Vec::new();
        for (name, ty) in column_types {
            let name = name.into();
            if columns.iter().any(|c| c.name == name) {
                return Err(ProtocolError::SchemaMismatch(format!(
                    "duplicate column {name}"
                )));
            }
            columns.push(Column {
                name,
                ty,
                values: Vec::new(),
            });
        }
        Ok(Self {
            columns,
            num_rows: 0,
        })
    }

    /// 创建预填充的表
    ///
    /// 列顺序以 `column_types` 为准；行数由第一列推导。
    ///
    /// # 错误
    ///
    /// - 两者键集合不同、或任一列长度与第一列不同：[`ProtocolError::SchemaMismatch`]
    /// - 单元值与声明类型不符：[`ProtocolError::CellType`]
    pub fn with_data<I, S, D, K>(column_data: D, column_types: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
        D: IntoIterator<Item = (K, Vec<CellValue>)>,
        K: Into<String>,
    {
        let mut table = Self::new(column_types)?;
        table.set_table_data(column_data)?;
        Ok(table)
    }

    /// 按 schema 解析线格式（列式 JSON 对象）
    ///
    /// `typeid` 字段被忽略；缺失的列或多余的列都视为 schema 不一致。
    pub fn from_wire(value: &Value, schema: &[(&str, ColumnType)]) -> Result<Self, ProtocolError> {
        let object = value
            .as_object()
            .ok_or_else(|| ProtocolError::Malformed(format!("table is not an object: {value}")))?;
        let mut data = Vec::with_capacity(schema.len());
        for (name, raw) in object.iter().filter(|(k, _)| k.as_str() != TYPE_ID_FIELD) {
            let ty = schema
                .iter()
                .find(|(n, _)| *n == name.as_str())
                .map(|(_, t)| *t)
                .ok_or_else(|| ProtocolError::SchemaMismatch(format!("unexpected column {name}")))?;
            data.push((name.clone(), json_column(name, raw, ty)?));
        }
        Self::with_data(data, schema.iter().copied())
    }

    /// 序列化为线格式：`{"typeid": ..., "<列名>": [..], ...}`，按列顺序
    pub fn to_wire(&self) -> Value {
        let mut object = Map::with_capacity(self.columns.len() + 1);
        object.insert(TYPE_ID_FIELD.to_string(), Value::from(TABLE_TYPE_ID));
        for column in &self.columns {
            object.insert(
                column.name.clone(),
                Value::Array(column.values.iter().map(CellValue::to_json).collect()),
            );
        }
        Value::Object(object)
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.column(name).map(|c| c.ty)
    }

    /// 有序的 (列名, 类型) 列表
    pub fn schema(&self) -> Vec<(&str, ColumnType)> {
        self.columns.iter().map(|c| (c.name.as_str(), c.ty)).collect()
    }

    /// 取得一列的底层数据
    pub fn get_column(&self, name: &str) -> Result<&[CellValue], ProtocolError> {
        self.column(name)
            .map(|c| c.values.as_slice())
            .ok_or_else(|| ProtocolError::UnknownColumn(name.to_string()))
    }

    /// 按调用方期望的类型取得一列
    ///
    /// # 错误
    ///
    /// - 列不存在：[`ProtocolError::UnknownColumn`]
    /// - 任一单元无法转换为 `T`：[`ProtocolError::CellType`]
    pub fn get_column_as<T: FromCell>(&self, name: &str) -> Result<Vec<T>, ProtocolError> {
        self.get_column(name)?
            .iter()
            .map(|cell| {
                T::from_cell(cell).ok_or_else(|| ProtocolError::CellType {
                    column: name.to_string(),
                    expected: T::COLUMN_TYPE,
                    actual: cell.type_name(),
                })
            })
            .collect()
    }

    /// 取得一行
    ///
    /// # 错误
    ///
    /// `index >= num_rows` 时返回 [`ProtocolError::IndexOutOfBounds`]。
    pub fn get_row(&self, index: usize) -> Result<TableRow, ProtocolError> {
        if index >= self.num_rows {
            return Err(ProtocolError::IndexOutOfBounds {
                index,
                rows: self.num_rows,
            });
        }
        Ok(self.row_unchecked(index))
    }

    /// 追加一行
    ///
    /// 行必须恰好为每个声明列提供一个值（多列、缺列、重复列都拒绝）。
    /// 所有检查在修改前完成，失败时表保持原样。
    pub fn add_row<I, K, V>(&mut self, row: I) -> Result<(), ProtocolError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<CellValue>,
    {
        let mut pending: Vec<Option<CellValue>> = vec![None; self.columns.len()];
        for (key, value) in row {
            let key = key.into();
            let index = self
                .columns
                .iter()
                .position(|c| c.name == key)
                .ok_or_else(|| ProtocolError::SchemaMismatch(format!("unexpected column {key}")))?;
            if pending[index].is_some() {
                return Err(ProtocolError::SchemaMismatch(format!(
                    "column {key} given twice"
                )));
            }
            pending[index] = Some(self.columns[index].ty.coerce(&key, value.into())?);
        }

        let mut values = Vec::with_capacity(pending.len());
        for (column, value) in self.columns.iter().zip(pending) {
            values.push(value.ok_or_else(|| {
                ProtocolError::SchemaMismatch(format!("missing column {}", column.name))
            })?);
        }

        for (column, value) in self.columns.iter_mut().zip(values) {
            column.values.push(value);
        }
        self.num_rows += 1;
        Ok(())
    }

    /// 整体替换底层数据
    ///
    /// 键集合必须与 schema 完全一致，所有列等长，单元类型匹配；
    /// `num_rows` 在同一操作中重新计算。失败时表保持原样。
    pub fn set_table_data<D, K>(&mut self, column_data: D) -> Result<(), ProtocolError>
    where
        D: IntoIterator<Item = (K, Vec<CellValue>)>,
        K: Into<String>,
    {
        let mut incoming: Vec<(String, Vec<CellValue>)> =
            column_data.into_iter().map(|(k, v)| (k.into(), v)).collect();

        if incoming.len() != self.columns.len() {
            return Err(ProtocolError::SchemaMismatch(format!(
                "expected {} columns, got {}",
                self.columns.len(),
                incoming.len()
            )));
        }

        let expected_rows = incoming.first().map_or(0, |(_, v)| v.len());
        let mut replacement = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let position = incoming
                .iter()
                .position(|(name, _)| *name == column.name)
                .ok_or_else(|| {
                    ProtocolError::SchemaMismatch(format!("missing column {}", column.name))
                })?;
            let (name, values) = incoming.swap_remove(position);
            if values.len() != expected_rows {
                return Err(ProtocolError::SchemaMismatch(format!(
                    "column {name} has {} rows, expected {expected_rows}",
                    values.len()
                )));
            }
            let values = values
                .into_iter()
                .map(|v| column.ty.coerce(&name, v))
                .collect::<Result<Vec<_>, _>>()?;
            replacement.push(values);
        }

        for (column, values) in self.columns.iter_mut().zip(replacement) {
            column.values = values;
        }
        self.num_rows = expected_rows;
        Ok(())
    }

    /// 惰性的行迭代器
    ///
    /// 行数在创建时确定；要重新迭代，再调用一次即可。
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            table: self,
            next: 0,
            end: self.num_rows,
        }
    }

    fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn row_unchecked(&self, index: usize) -> TableRow {
        TableRow {
            entries: self
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.values[index].clone()))
                .collect(),
        }
    }
}

/// [`MalcolmTable::rows`] 返回的迭代器
pub struct Rows<'a> {
    table: &'a MalcolmTable,
    next: usize,
    end: usize,
}

impl Iterator for Rows<'_> {
    type Item = TableRow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let row = self.table.row_unchecked(self.next);
        self.next += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Rows<'_> {}

impl<'a> IntoIterator for &'a MalcolmTable {
    type Item = TableRow;
    type IntoIter = Rows<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows()
    }
}

fn json_column(name: &str, raw: &Value, ty: ColumnType) -> Result<Vec<CellValue>, ProtocolError> {
    raw.as_array()
        .ok_or_else(|| ProtocolError::Malformed(format!("column {name} is not an array")))?
        .iter()
        .map(|v| CellValue::from_json(v, name, ty))
        .collect()
}

impl Serialize for MalcolmTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len() + 1))?;
        map.serialize_entry(TYPE_ID_FIELD, TABLE_TYPE_ID)?;
        for column in &self.columns {
            let values: Vec<Value> = column.values.iter().map(CellValue::to_json).collect();
            map.serialize_entry(&column.name, &values)?;
        }
        map.end()
    }
}

/// 无 schema 的反序列化：列类型从数据推断
///
/// 已知 schema 时优先用 [`MalcolmTable::from_wire`]，推断无法区分空列的类型。
impl<'de> Deserialize<'de> for MalcolmTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let object = Map::<String, Value>::deserialize(deserializer)?;
        let mut types = Vec::with_capacity(object.len());
        let mut data = Vec::with_capacity(object.len());
        for (name, raw) in object.iter().filter(|(k, _)| k.as_str() != TYPE_ID_FIELD) {
            let array = raw
                .as_array()
                .ok_or_else(|| D::Error::custom(format!("column {name} is not an array")))?;
            let ty = ColumnType::infer(array);
            types.push((name.clone(), ty));
            data.push((name.clone(), json_column(name, raw, ty).map_err(D::Error::custom)?));
        }
        MalcolmTable::with_data(data, types).map_err(D::Error::custom)
    }
}
