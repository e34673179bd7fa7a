mod common;

use common::{cfb_header, Book, V};
use rstest::rstest;
use xlrecords::{
    dump, load, parse, parse_with_options, rows, sheet_names, CellValue, ColumnSelector,
    ErrorKind, HeaderRow, HeaderSpec, ParseOptions, SheetSelector, SheetType, Workbook,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn scenario() -> Book {
    Book::new().sheet(
        "Sheet1",
        vec![
            vec![V::Str("one"), V::Str("two"), V::Str("forty-four")],
            vec![V::Num(1.), V::Num(2.), V::Num(44.)],
        ],
    )
}

fn people() -> Book {
    Book::new()
        .sheet(
            "People",
            vec![
                vec![V::Str("Name"), V::Str(" Age "), V::Str("Member"), V::Str("Joined")],
                vec![V::Str("Ann"), V::Num(31.), V::Bool(true), V::Date(44060.)],
                vec![V::Str("Bob"), V::Num(27.5), V::Bool(false), V::Date(44060.5)],
                vec![V::Str("Zoé"), V::Err("#N/A")],
            ],
        )
        .sheet(
            "Formulas",
            vec![
                vec![V::Str("num"), V::Str("text"), V::Str("blank"), V::Str("none")],
                vec![V::FormulaNum(2.), V::FormulaStr("ab"), V::Blank, V::FormulaEmpty],
                vec![V::FormulaNum(-0.25), V::Err("#DIV/0!"), V::Skip, V::FormulaEmpty],
            ],
        )
}

fn num(v: f64) -> CellValue {
    CellValue::Number(v)
}

#[rstest]
#[case("xls")]
#[case("xlsx")]
#[case("xlsm")]
#[case("xlsb")]
fn header_positions_and_names(#[case] tag: &str) {
    init_logger();
    let bytes = scenario().build(tag);
    let spec: HeaderSpec = [("one", "one"), ("two", "1"), ("forty-four", "2")]
        .into_iter()
        .collect();
    let records = parse(tag, &bytes, &spec, None).unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.keys().collect::<Vec<_>>(), ["one", "two", "forty-four"]);
    assert_eq!(record.get("one"), Some(&num(1.)));
    assert_eq!(record.get("two"), Some(&num(2.)));
    assert_eq!(record.get("forty-four"), Some(&num(44.)));
}

#[rstest]
#[case("xls")]
#[case("xlsx")]
#[case("xlsm")]
#[case("xlsb")]
fn digit_string_is_a_position(#[case] tag: &str) {
    let bytes = scenario().build(tag);
    let as_text: HeaderSpec = [("v", "2")].into_iter().collect();
    let as_number = HeaderSpec::new().column("v", 2usize);
    assert_eq!(
        parse(tag, &bytes, &as_text, None).unwrap(),
        parse(tag, &bytes, &as_number, None).unwrap()
    );
}

#[rstest]
#[case("xls")]
#[case("xlsx")]
#[case("xlsm")]
#[case("xlsb")]
fn record_count_and_width(#[case] tag: &str) {
    let bytes = people().build(tag);
    let spec: HeaderSpec = [("name", "name"), ("age", "age")].into_iter().collect();
    let records = parse(tag, &bytes, &spec, Some(0usize.into())).unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.len() == 2));
    assert_eq!(records[2].get("name"), Some(&CellValue::from("Zoé")));
}

#[rstest]
#[case("xls")]
#[case("xlsx")]
#[case("xlsm")]
#[case("xlsb")]
fn value_types(#[case] tag: &str) {
    init_logger();
    let bytes = people().build(tag);
    let spec: HeaderSpec = [
        ("age", "Age"),
        ("member", "member"),
        ("joined", "JOINED"),
        ("extra", "7"),
    ]
    .into_iter()
    .collect();
    let records = parse(tag, &bytes, &spec, Some("People".into())).unwrap();

    assert_eq!(records[0].get("age"), Some(&num(31.)));
    assert_eq!(records[1].get("age"), Some(&num(27.5)));
    assert_eq!(records[0].get("member"), Some(&CellValue::Bool(true)));
    assert_eq!(records[1].get("member"), Some(&CellValue::Bool(false)));

    let joined = records[0].get("joined").unwrap().get_datetime().unwrap();
    assert!(joined.is_datetime());
    assert_eq!(joined.as_f64(), 44060.);
    assert_eq!(joined.to_string(), "2020-08-17T00:00:00");
    assert_eq!(
        records[1].get("joined").unwrap().to_string(),
        "2020-08-17T12:00:00"
    );

    // error cell, then a short row
    assert_eq!(records[2].get("age"), Some(&CellValue::from("#N/A")));
    assert_eq!(records[2].get("member"), Some(&CellValue::Empty));
    assert!(records.iter().all(|r| r.get("extra") == Some(&CellValue::Empty)));
}

#[rstest]
#[case("xls")]
#[case("xlsx")]
#[case("xlsm")]
#[case("xlsb")]
fn cached_formula_values(#[case] tag: &str) {
    let bytes = people().build(tag);
    let spec: HeaderSpec = [
        ("num", "num"),
        ("text", "text"),
        ("blank", "blank"),
        ("none", "none"),
    ]
    .into_iter()
    .collect();
    let records = parse(tag, &bytes, &spec, Some("Formulas".into())).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("num"), Some(&num(2.)));
    assert_eq!(records[0].get("text"), Some(&CellValue::from("ab")));
    assert_eq!(records[0].get("blank"), Some(&CellValue::Empty));
    assert_eq!(records[1].get("num"), Some(&num(-0.25)));
    assert_eq!(records[1].get("text"), Some(&CellValue::from("#DIV/0!")));
    // no cached value
    assert!(records.iter().all(|r| r.get("none") == Some(&CellValue::Empty)));
}

#[rstest]
#[case("xls")]
#[case("xlsx")]
#[case("xlsm")]
#[case("xlsb")]
fn date_1904(#[case] tag: &str) {
    let bytes = Book::new()
        .sheet("S", vec![vec![V::Str("d")], vec![V::Date(44060. - 1462.)]])
        .date1904()
        .build(tag);
    let spec: HeaderSpec = [("d", "d")].into_iter().collect();
    let records = parse(tag, &bytes, &spec, None).unwrap();
    let d = records[0].get("d").unwrap().get_datetime().unwrap();
    assert!(d.is_1904());
    assert_eq!(d.as_f64(), 42598.);
    assert_eq!(d.to_string(), "2020-08-17T00:00:00");
}

#[rstest]
#[case("xls")]
#[case("xlsx")]
#[case("xlsm")]
#[case("xlsb")]
fn dump_then_load(#[case] tag: &str) {
    let bytes = people().build(tag);
    for sheet in ["People", "Formulas"] {
        let spec: HeaderSpec = (0..5usize).map(|i| (format!("c{i}"), i)).collect();
        let records = parse(tag, &bytes, &spec, Some(sheet.into())).unwrap();
        let buf = dump(tag, &bytes, &spec, Some(sheet.into())).unwrap();
        assert_eq!(load(&buf).unwrap(), records);
    }
}

#[rstest]
#[case("xls")]
#[case("xlsx")]
#[case("xlsm")]
#[case("xlsb")]
fn sheet_selection(#[case] tag: &str) {
    let bytes = people().build(tag);
    assert_eq!(sheet_names(tag, &bytes).unwrap(), ["People", "Formulas"]);

    // ordinals follow declaration order
    let spec = HeaderSpec::new().column("first", 0usize);
    let by_index = parse(tag, &bytes, &spec, Some(SheetSelector::Index(1))).unwrap();
    let by_name = parse(tag, &bytes, &spec, Some("Formulas".into())).unwrap();
    assert_eq!(by_index, by_name);
    assert_eq!(by_index[0].get("first"), Some(&num(2.)));

    let err = parse(tag, &bytes, &spec, Some("formulas".into())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SheetNotFound);
    let err = parse(tag, &bytes, &spec, Some(2usize.into())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SheetNotFound);
    assert_eq!(err.to_string(), "Cannot find sheet #2");
}

#[rstest]
#[case("xls")]
#[case("xlsx")]
#[case("xlsm")]
#[case("xlsb")]
fn missing_header(#[case] tag: &str) {
    let bytes = scenario().build(tag);
    let spec: HeaderSpec = [("one", "one"), ("three", "three")].into_iter().collect();
    let err = parse(tag, &bytes, &spec, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HeaderNotFound);
    assert_eq!(err.to_string(), "Cannot find header named 'three'");
}

#[rstest]
#[case("xls")]
#[case("xlsx")]
#[case("xlsm")]
#[case("xlsb")]
fn malformed_container(#[case] tag: &str) {
    let bytes = scenario().build(tag);
    let spec = HeaderSpec::new().column("one", 0usize);
    let err = parse(tag, &bytes[..bytes.len() / 2], &spec, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedContainer);
    let err = parse(tag, &[], &spec, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedContainer);
}

#[rstest]
#[case("xls")]
#[case("xlsx")]
#[case("xlsm")]
#[case("xlsb")]
fn truncated_sheet(#[case] tag: &str) {
    init_logger();
    let spec = HeaderSpec::new().column("one", 0usize);
    let complete = scenario().build(tag);
    assert_eq!(parse(tag, &complete, &spec, None).unwrap().len(), 1);

    // the container is intact, the sheet stops after its last cell
    let truncated = scenario().truncated().build(tag);
    let err = parse(tag, &truncated, &spec, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedContainer);
    let err = rows(&truncated, "Sheet1", &["one"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedContainer);
}

#[rstest]
#[case::difat_sector_cut_short(|h: &mut Vec<u8>| {
    h[68..72].copy_from_slice(&0u32.to_le_bytes());
    h[72..76].copy_from_slice(&1u32.to_le_bytes());
    h.extend_from_slice(&[0xFF, 0xFF]);
})]
#[case::oversized_fat(|h: &mut Vec<u8>| h[44..48].copy_from_slice(&u32::MAX.to_le_bytes()))]
#[case::oversized_mini_fat(|h: &mut Vec<u8>| h[64..68].copy_from_slice(&u32::MAX.to_le_bytes()))]
#[case::mini_cutoff(|h: &mut Vec<u8>| h[56..60].copy_from_slice(&0u32.to_le_bytes()))]
fn malformed_compound_file(#[case] corrupt: fn(&mut Vec<u8>)) {
    let mut bytes = cfb_header();
    corrupt(&mut bytes);
    let spec = HeaderSpec::new().column("one", 0usize);
    let err = parse("xls", &bytes, &spec, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedContainer);
    let err = sheet_names("xls", &bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedContainer);
}

#[test]
fn format_tag_mismatch() {
    let spec = HeaderSpec::new().column("one", 0usize);
    let xlsx = scenario().xlsx();
    assert_eq!(
        parse("xls", &xlsx, &spec, None).unwrap_err().kind(),
        ErrorKind::MalformedContainer
    );
    assert_eq!(
        parse("csv", &xlsx, &spec, None).unwrap_err().kind(),
        ErrorKind::UnsupportedFormat
    );
    assert!(parse(".XLSX", &xlsx, &spec, None).is_ok());
}

#[rstest]
#[case("xls")]
#[case("xlsx")]
#[case("xlsm")]
#[case("xlsb")]
fn raw_rows(#[case] tag: &str) {
    let bytes = people().build(tag);

    let all = rows(&bytes, "People", &[] as &[&str]).unwrap();
    assert_eq!(
        all,
        [
            vec!["Ann", "31", "true", "2020-08-17T00:00:00"],
            vec!["Bob", "27.5", "false", "2020-08-17T12:00:00"],
            vec!["Zoé", "#N/A", "", ""],
        ]
    );

    let some = rows(&bytes, "People", &["member", "name"]).unwrap();
    assert_eq!(some, [["true", "Ann"], ["false", "Bob"], ["", "Zoé"]]);

    let err = rows(&bytes, "Nobody", &["name"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SheetNotFound);
}

#[rstest]
#[case("xls")]
#[case("xlsx")]
#[case("xlsm")]
#[case("xlsb")]
fn options(#[case] tag: &str) {
    let bytes = Book::new()
        .sheet(
            "S",
            vec![
                vec![V::Str("report")],
                vec![],
                vec![V::Skip, V::Str("key"), V::Str("value")],
                vec![V::Skip, V::Str("a"), V::Str("  ")],
                vec![V::Skip, V::Str(" b "), V::Num(3.)],
            ],
        )
        .build(tag);
    let spec: HeaderSpec = [("k", "key"), ("v", "VALUE")].into_iter().collect();

    // the first non-empty row is the title, not the header
    let err = parse(tag, &bytes, &spec, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HeaderNotFound);

    let options = ParseOptions::new().with_header_row(HeaderRow::Row(2));
    let records = parse_with_options(tag, &bytes, &spec, &options).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("v"), Some(&CellValue::from("  ")));
    assert_eq!(records[1].get("k"), Some(&CellValue::from(" b ")));

    let options = options.with_trim_text(true);
    let records = parse_with_options(tag, &bytes, &spec, &options).unwrap();
    assert_eq!(records[0].get("v"), Some(&CellValue::Empty));
    assert_eq!(records[1].get("k"), Some(&CellValue::from("b")));

    // without a header row every row is data and names cannot resolve
    let options = ParseOptions::new().with_headers(false).with_sheet(0usize);
    let positional = HeaderSpec::new().column("first", ColumnSelector::Position(0));
    let records = parse_with_options(tag, &bytes, &positional, &options).unwrap();
    assert_eq!(records.len(), 5);
    assert_eq!(records[0].get("first"), Some(&CellValue::from("report")));
    assert_eq!(records[1].get("first"), Some(&CellValue::Empty));
    let err = parse_with_options(tag, &bytes, &spec, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HeaderNotFound);
}

#[rstest]
#[case("xls")]
#[case("xlsx")]
#[case("xlsm")]
#[case("xlsb")]
fn workbook_reads_several_sheets(#[case] tag: &str) {
    let bytes = people().build(tag);
    let mut workbook = Workbook::open(tag, &bytes).unwrap();
    let sheets = workbook.sheets();
    assert_eq!(sheets.len(), 2);
    assert!(sheets.iter().all(|s| s.typ == SheetType::WorkSheet));

    let options = ParseOptions::default();
    let people = workbook.worksheet_table(&0usize.into(), &options).unwrap();
    let formulas = workbook.worksheet_table(&1usize.into(), &options).unwrap();
    assert_eq!(people.height(), 4);
    assert_eq!(people.width(), 4);
    assert_eq!(formulas.height(), 3);
    assert_eq!(formulas.get((2, 2)), &CellValue::Empty);
}

#[rstest]
#[case("xls")]
#[case("xlsx")]
#[case("xlsm")]
#[case("xlsb")]
fn empty_sheet(#[case] tag: &str) {
    let bytes = Book::new().sheet("Empty", vec![]).build(tag);
    let spec = HeaderSpec::new().column("a", 0usize);
    assert!(parse(tag, &bytes, &spec, None).unwrap().is_empty());
    let spec = HeaderSpec::new().column("a", "a");
    assert_eq!(
        parse(tag, &bytes, &spec, None).unwrap_err().kind(),
        ErrorKind::HeaderNotFound
    );
}
