//! 协议值类型的属性测试
//!
//! 使用 proptest 验证表格线格式与版本比较的性质。

use malcolm_sdk::protocol::constants::DETECTORS_TABLE_SCHEMA;
use malcolm_sdk::protocol::{CellValue, ColumnType, MalcolmTable, MalcolmVersion};
use proptest::prelude::*;

fn detector_row() -> impl Strategy<Value = (bool, String, String, f64, i64)> {
    (
        any::<bool>(),
        "[a-z]{1,8}",
        "[A-Z]{2}-[A-Z]{3}-[0-9]{2}",
        0.0..10.0f64,
        1..100i64,
    )
}

fn build_table(rows: &[(bool, String, String, f64, i64)]) -> MalcolmTable {
    let mut table = MalcolmTable::new(DETECTORS_TABLE_SCHEMA).unwrap();
    for (enable, name, mri, exposure, frames) in rows {
        table
            .add_row([
                ("enable", CellValue::from(*enable)),
                ("name", CellValue::from(name.as_str())),
                ("mri", CellValue::from(mri.as_str())),
                ("exposure", CellValue::from(*exposure)),
                ("framesPerStep", CellValue::from(*frames)),
            ])
            .unwrap();
    }
    table
}

fn column_type() -> impl Strategy<Value = ColumnType> {
    prop_oneof![
        Just(ColumnType::Boolean),
        Just(ColumnType::Integer),
        Just(ColumnType::Float),
        Just(ColumnType::String),
    ]
}

fn cell(ty: ColumnType) -> BoxedStrategy<CellValue> {
    match ty {
        ColumnType::Boolean => any::<bool>().prop_map(CellValue::Bool).boxed(),
        ColumnType::Integer => any::<i64>().prop_map(CellValue::Int).boxed(),
        ColumnType::Float => (-1.0e6..1.0e6f64).prop_map(CellValue::Float).boxed(),
        ColumnType::String => "[a-z0-9 ]{0,8}".prop_map(CellValue::Str).boxed(),
    }
}

/// 任意 schema（1..6 列）及与之匹配的列式数据
fn any_table() -> impl Strategy<Value = (Vec<(String, ColumnType)>, Vec<Vec<CellValue>>)> {
    (prop::collection::vec(column_type(), 1..6), 0..12usize).prop_flat_map(|(types, rows)| {
        let schema: Vec<(String, ColumnType)> = types
            .iter()
            .enumerate()
            .map(|(i, ty)| (format!("col{i}"), *ty))
            .collect();
        let columns: Vec<_> = types
            .iter()
            .map(|ty| prop::collection::vec(cell(*ty), rows))
            .collect();
        (Just(schema), columns)
    })
}

proptest! {
    /// 任意 schema：逐行读取再按列重建，得到同一张表；线格式往返也不变
    #[test]
    fn table_rebuilt_from_rows((schema, columns) in any_table()) {
        let data: Vec<(String, Vec<CellValue>)> = schema
            .iter()
            .map(|(name, _)| name.clone())
            .zip(columns.iter().cloned())
            .collect();
        let table = MalcolmTable::with_data(data, schema.clone()).unwrap();
        prop_assert_eq!(table.num_rows(), columns[0].len());

        let mut rebuilt: Vec<(String, Vec<CellValue>)> =
            schema.iter().map(|(name, _)| (name.clone(), Vec::new())).collect();
        for row in table.rows() {
            prop_assert_eq!(row.len(), schema.len());
            for (name, values) in rebuilt.iter_mut() {
                values.push(row.get(name).cloned().unwrap());
            }
        }
        let copy = MalcolmTable::with_data(rebuilt, schema.clone()).unwrap();
        prop_assert_eq!(&copy, &table);

        let borrowed: Vec<(&str, ColumnType)> =
            schema.iter().map(|(name, ty)| (name.as_str(), *ty)).collect();
        let back = MalcolmTable::from_wire(&table.to_wire(), &borrowed).unwrap();
        prop_assert_eq!(&back, &table);
    }

    /// 线格式往返后表格不变（列顺序、行数、单元值）
    #[test]
    fn table_wire_roundtrip(rows in prop::collection::vec(detector_row(), 0..20)) {
        let table = build_table(&rows);
        let back = MalcolmTable::from_wire(&table.to_wire(), &DETECTORS_TABLE_SCHEMA).unwrap();
        prop_assert_eq!(back.num_rows(), rows.len());
        prop_assert_eq!(&back, &table);
    }

    /// 逐行读取与按列读取一致
    #[test]
    fn table_rows_match_columns(rows in prop::collection::vec(detector_row(), 1..20)) {
        let table = build_table(&rows);
        let names = table.get_column_as::<String>("name").unwrap();
        let frames = table.get_column_as::<i64>("framesPerStep").unwrap();
        for (i, row) in table.rows().enumerate() {
            prop_assert_eq!(row.get_as::<String>("name"), Some(names[i].clone()));
            prop_assert_eq!(row.get_as::<i64>("framesPerStep"), Some(frames[i]));
        }
    }

    /// 添加一行只让行数加一
    #[test]
    fn table_add_row_increments(rows in prop::collection::vec(detector_row(), 0..10), extra in detector_row()) {
        let mut table = build_table(&rows);
        let before = table.num_rows();
        let (enable, name, mri, exposure, frames) = extra;
        table.add_row([
            ("enable", CellValue::from(enable)),
            ("name", CellValue::from(name)),
            ("mri", CellValue::from(mri)),
            ("exposure", CellValue::from(exposure)),
            ("framesPerStep", CellValue::from(frames)),
        ]).unwrap();
        prop_assert_eq!(table.num_rows(), before + 1);
    }

    /// 版本比较与 (major, minor) 字典序一致
    #[test]
    fn version_ordering_is_lexicographic(a in 0..100u32, b in 0..100u32, c in 0..100u32, d in 0..100u32) {
        let left: MalcolmVersion = format!("{a}.{b}").parse().unwrap();
        let right: MalcolmVersion = format!("{c}.{d}").parse().unwrap();
        prop_assert_eq!(left.is_version_or_above(&right), (a, b) >= (c, d));
        prop_assert_eq!(left.cmp(&right), (a, b).cmp(&(c, d)));
    }

    /// 补丁号与前缀 `v` 不影响解析结果
    #[test]
    fn version_ignores_patch(a in 0..1000u32, b in 0..1000u32, patch in 0..1000u32) {
        let plain: MalcolmVersion = format!("{a}.{b}").parse().unwrap();
        let patched: MalcolmVersion = format!("v{a}.{b}.{patch}").parse().unwrap();
        prop_assert_eq!(plain, patched);
        prop_assert_eq!(plain.to_string(), format!("{a}.{b}"));
    }

    /// 负数分量总是被拒绝
    #[test]
    fn version_rejects_negative(a in 1..1000i64, b in 0..1000i64) {
        let negative = format!("-{a}.{b}");
        prop_assert!(negative.parse::<MalcolmVersion>().is_err());
        prop_assert!(MalcolmVersion::new(-a, b).is_err());
    }
}
