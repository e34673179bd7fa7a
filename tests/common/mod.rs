//! In-memory workbooks for the integration tests
//!
//! Every builder writes the same logical content: shared strings for text,
//! xf 1 carrying the built-in date format 14, integers as RK where the
//! format has it.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

#[derive(Debug, Clone)]
pub enum V {
    Num(f64),
    Str(&'static str),
    Bool(bool),
    /// Error literal, e.g. `#N/A`
    Err(&'static str),
    /// Serial number with a date format
    Date(f64),
    /// Formula with a cached number
    FormulaNum(f64),
    /// Formula with a cached string
    FormulaStr(&'static str),
    /// Formula without a cached value (an empty string result in BIFF)
    FormulaEmpty,
    /// Formatted cell without a value
    Blank,
    /// No cell at all
    Skip,
}

pub struct Book {
    sheets: Vec<(String, Vec<Vec<V>>)>,
    date1904: bool,
    truncated: bool,
}

impl Book {
    pub fn new() -> Self {
        Book {
            sheets: Vec::new(),
            date1904: false,
            truncated: false,
        }
    }

    pub fn sheet(mut self, name: &str, rows: Vec<Vec<V>>) -> Self {
        self.sheets.push((name.to_string(), rows));
        self
    }

    pub fn date1904(mut self) -> Self {
        self.date1904 = true;
        self
    }

    /// Sheets stop right after their last cell, without any closing record
    pub fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }

    pub fn build(&self, tag: &str) -> Vec<u8> {
        match tag {
            "xls" => self.xls(),
            "xlsx" => self.xlsx(),
            "xlsm" => self.xlsm(),
            "xlsb" => self.xlsb(),
            t => panic!("no fixture builder for {t}"),
        }
    }

    fn shared_strings(&self) -> Vec<&'static str> {
        let mut strings = Vec::new();
        for (_, rows) in &self.sheets {
            for v in rows.iter().flatten() {
                if let V::Str(s) = v {
                    if !strings.contains(s) {
                        strings.push(*s);
                    }
                }
            }
        }
        strings
    }

    fn cells(rows: &[Vec<V>]) -> impl Iterator<Item = (u32, &[V])> {
        rows.iter()
            .enumerate()
            .map(|(r, row)| (r as u32, row.as_slice()))
    }

    // --- xlsx ---

    pub fn xlsx(&self) -> Vec<u8> {
        self.ooxml(false)
    }

    /// Macro-enabled package: its own main content type and a VBA project
    pub fn xlsm(&self) -> Vec<u8> {
        self.ooxml(true)
    }

    fn ooxml(&self, macro_enabled: bool) -> Vec<u8> {
        let strings = self.shared_strings();
        let mut files = Vec::new();

        let mut workbook = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
        );
        if self.date1904 {
            workbook.push_str(r#"<workbookPr date1904="1"/>"#);
        }
        workbook.push_str("<sheets>");
        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (i, (name, rows)) in self.sheets.iter().enumerate() {
            workbook.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                escape(name),
                i + 1,
                i + 1
            ));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                i + 1,
                i + 1
            ));
            files.push((
                format!("xl/worksheets/sheet{}.xml", i + 1),
                xlsx_sheet(rows, &strings, self.truncated).into_bytes(),
            ));
        }
        workbook.push_str("</sheets></workbook>");
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
            self.sheets.len() + 1
        ));
        if macro_enabled {
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.microsoft.com/office/2006/relationships/vbaProject" Target="vbaProject.bin"/>"#,
                self.sheets.len() + 2
            ));
            files.push(("xl/vbaProject.bin".to_string(), vba_project()));
        }
        rels.push_str("</Relationships>");

        let main = if macro_enabled {
            "application/vnd.ms-excel.sheet.macroEnabled.main+xml"
        } else {
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"
        };
        let mut content_types = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="bin" ContentType="application/vnd.ms-office.vbaProject"/><Override PartName="/xl/workbook.xml" ContentType="{main}"/>"#
        );
        for i in 0..self.sheets.len() {
            content_types.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
                i + 1
            ));
        }
        content_types.push_str("</Types>");
        files.push(("[Content_Types].xml".to_string(), content_types.into_bytes()));

        let mut sst = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">"#,
            strings.len()
        );
        for s in &strings {
            sst.push_str(&format!(r#"<si><t xml:space="preserve">{}</t></si>"#, escape(s)));
        }
        sst.push_str("</sst>");

        let styles = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="14" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs></styleSheet>"#;

        files.push(("xl/workbook.xml".to_string(), workbook.into_bytes()));
        files.push(("xl/_rels/workbook.xml.rels".to_string(), rels.into_bytes()));
        files.push(("xl/sharedStrings.xml".to_string(), sst.into_bytes()));
        files.push(("xl/styles.xml".to_string(), styles.as_bytes().to_vec()));
        zip_files(&files)
    }

    // --- xlsb ---

    pub fn xlsb(&self) -> Vec<u8> {
        let strings = self.shared_strings();
        let mut files = Vec::new();

        let mut workbook = Vec::new();
        record(&mut workbook, 0x0083, &[]); // BrtBeginBook
        let mut wb_prop = vec![0u8; 12];
        if self.date1904 {
            wb_prop[0] = 0x01;
        }
        record(&mut workbook, 0x0099, &wb_prop); // BrtWbProp
        record(&mut workbook, 0x008F, &[]); // BrtBeginBundleShs
        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (i, (name, rows)) in self.sheets.iter().enumerate() {
            let mut bundle = Vec::new();
            bundle.extend_from_slice(&0u32.to_le_bytes());
            bundle.extend_from_slice(&(i as u32 + 1).to_le_bytes());
            bundle.extend(wide(&format!("rId{}", i + 1)));
            bundle.extend(wide(name));
            record(&mut workbook, 0x009C, &bundle); // BrtBundleSh
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.bin"/>"#,
                i + 1,
                i + 1
            ));
            files.push((
                format!("xl/worksheets/sheet{}.bin", i + 1),
                xlsb_sheet(rows, &strings, self.truncated),
            ));
        }
        record(&mut workbook, 0x0090, &[]); // BrtEndBundleShs
        record(&mut workbook, 0x0084, &[]); // BrtEndBook
        rels.push_str("</Relationships>");

        let mut sst = Vec::new();
        let mut begin = (strings.len() as u32).to_le_bytes().to_vec();
        begin.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        record(&mut sst, 0x009F, &begin);
        for s in &strings {
            let mut item = vec![0u8];
            item.extend(wide(s));
            record(&mut sst, 0x0013, &item);
        }
        record(&mut sst, 0x00A0, &[]);

        let mut styles = Vec::new();
        record(&mut styles, 0x0116, &[]); // BrtBeginStyleSheet
        record(&mut styles, 0x0267, &0u32.to_le_bytes()); // BrtBeginFmts
        record(&mut styles, 0x0268, &[]);
        record(&mut styles, 0x0272, &1u32.to_le_bytes()); // BrtBeginCellStyleXFs
        record(&mut styles, 0x002F, &xf(0xFFFF, 0));
        record(&mut styles, 0x0273, &[]);
        record(&mut styles, 0x0269, &2u32.to_le_bytes()); // BrtBeginCellXFs
        record(&mut styles, 0x002F, &xf(0, 0));
        record(&mut styles, 0x002F, &xf(0, 14));
        record(&mut styles, 0x026A, &[]);
        record(&mut styles, 0x0117, &[]); // BrtEndStyleSheet

        files.push(("xl/workbook.bin".to_string(), workbook));
        files.push(("xl/_rels/workbook.bin.rels".to_string(), rels.into_bytes()));
        files.push(("xl/sharedStrings.bin".to_string(), sst));
        files.push(("xl/styles.bin".to_string(), styles));
        zip_files(&files)
    }

    // --- xls ---

    pub fn xls(&self) -> Vec<u8> {
        let strings = self.shared_strings();
        let sheets: Vec<Vec<u8>> = self
            .sheets
            .iter()
            .map(|(_, rows)| xls_sheet(rows, &strings, self.truncated))
            .collect();

        let globals_len = self.xls_globals(&strings, &vec![0; sheets.len()]).len();
        let mut offsets = Vec::new();
        let mut pos = globals_len;
        for s in &sheets {
            offsets.push(pos as u32);
            pos += s.len();
        }
        let mut stream = self.xls_globals(&strings, &offsets);
        for s in &sheets {
            stream.extend_from_slice(s);
        }

        let mut comp = cfb::CompoundFile::create(Cursor::new(Vec::new())).unwrap();
        {
            let mut workbook = comp.create_stream("/Workbook").unwrap();
            workbook.write_all(&stream).unwrap();
            workbook.flush().unwrap();
        }
        comp.flush().unwrap();
        comp.into_inner().into_inner()
    }

    fn xls_globals(&self, strings: &[&str], offsets: &[u32]) -> Vec<u8> {
        let mut out = Vec::new();
        biff(&mut out, 0x0809, &bof(0x0005));
        biff(&mut out, 0x0042, &1200u16.to_le_bytes()); // CodePage
        biff(&mut out, 0x0022, &(self.date1904 as u16).to_le_bytes()); // Date1904
        biff(&mut out, 0x00E0, &xls_xf(0));
        biff(&mut out, 0x00E0, &xls_xf(14));
        for ((name, _), offset) in self.sheets.iter().zip(offsets) {
            let mut data = offset.to_le_bytes().to_vec();
            data.extend_from_slice(&[0, 0]); // visible worksheet
            data.push(name.encode_utf16().count() as u8);
            data.extend(xls_chars(name));
            biff(&mut out, 0x0085, &data);
        }
        let mut sst = (strings.len() as u32).to_le_bytes().to_vec();
        sst.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        for s in strings {
            sst.extend_from_slice(&(s.encode_utf16().count() as u16).to_le_bytes());
            sst.extend(xls_chars(s));
        }
        biff(&mut out, 0x00FC, &sst);
        biff(&mut out, 0x000A, &[]);
        out
    }
}

/// Compound file holding a `VBA/dir` stream, enough to look like a project
fn vba_project() -> Vec<u8> {
    let mut comp = cfb::CompoundFile::create(Cursor::new(Vec::new())).unwrap();
    comp.create_storage("/VBA").unwrap();
    {
        let mut dir = comp.create_stream("/VBA/dir").unwrap();
        dir.write_all(&[0x01, 0x00, 0x00]).unwrap();
        dir.flush().unwrap();
    }
    comp.flush().unwrap();
    comp.into_inner().into_inner()
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn column_name(mut col: u32) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (col % 26) as u8);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    name.reverse();
    String::from_utf8(name).unwrap()
}

fn xlsx_sheet(rows: &[Vec<V>], strings: &[&str], truncated: bool) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in Book::cells(rows) {
        if row.iter().all(|v| matches!(v, V::Skip)) {
            continue;
        }
        xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, v) in row.iter().enumerate() {
            let pos = format!("{}{}", column_name(c as u32), r + 1);
            let cell = match v {
                V::Num(n) => format!(r#"<c r="{pos}"><v>{n}</v></c>"#),
                V::Str(s) => {
                    let idx = strings.iter().position(|x| x == s).unwrap();
                    format!(r#"<c r="{pos}" t="s"><v>{idx}</v></c>"#)
                }
                V::Bool(b) => format!(r#"<c r="{pos}" t="b"><v>{}</v></c>"#, *b as u8),
                V::Err(e) => format!(r#"<c r="{pos}" t="e"><v>{e}</v></c>"#),
                V::Date(n) => format!(r#"<c r="{pos}" s="1"><v>{n}</v></c>"#),
                V::FormulaNum(n) => format!(r#"<c r="{pos}"><f>SUM(1,1)</f><v>{n}</v></c>"#),
                V::FormulaStr(s) => format!(
                    r#"<c r="{pos}" t="str"><f>"a"&amp;"b"</f><v>{}</v></c>"#,
                    escape(s)
                ),
                V::FormulaEmpty => format!(r#"<c r="{pos}"><f>A1+1</f></c>"#),
                V::Blank => format!(r#"<c r="{pos}" s="1"/>"#),
                V::Skip => continue,
            };
            xml.push_str(&cell);
        }
        xml.push_str("</row>");
    }
    if !truncated {
        xml.push_str("</sheetData></worksheet>");
    }
    xml
}

fn zip_files(files: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut zip_writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in files {
        zip_writer.start_file(name.as_str(), options).unwrap();
        zip_writer.write_all(content).unwrap();
    }
    zip_writer.finish().unwrap().into_inner()
}

fn wide(s: &str) -> Vec<u8> {
    let mut out = (s.encode_utf16().count() as u32).to_le_bytes().to_vec();
    for c in s.encode_utf16() {
        out.extend_from_slice(&c.to_le_bytes());
    }
    out
}

/// BIFF12 record: 7-bit encoded type and length
fn record(out: &mut Vec<u8>, typ: u16, data: &[u8]) {
    if typ < 0x80 {
        out.push(typ as u8);
    } else {
        out.push((typ & 0x7F) as u8 | 0x80);
        out.push((typ >> 7) as u8);
    }
    let mut len = data.len();
    loop {
        let b = (len & 0x7F) as u8;
        len >>= 7;
        if len == 0 {
            out.push(b);
            break;
        }
        out.push(b | 0x80);
    }
    out.extend_from_slice(data);
}

fn xf(parent: u16, ifmt: u16) -> Vec<u8> {
    let mut data = parent.to_le_bytes().to_vec();
    data.extend_from_slice(&ifmt.to_le_bytes());
    data.resize(16, 0);
    data
}

fn error_code(e: &str) -> u8 {
    match e {
        "#NULL!" => 0x00,
        "#DIV/0!" => 0x07,
        "#VALUE!" => 0x0F,
        "#REF!" => 0x17,
        "#NAME?" => 0x1D,
        "#NUM!" => 0x24,
        "#N/A" => 0x2A,
        e => panic!("unknown error literal {e}"),
    }
}

/// RK value of an integer that fits 30 bits
fn rk_integer(n: f64) -> Option<u32> {
    if n.fract() == 0. && (-(1 << 29) as f64..(1 << 29) as f64).contains(&n) {
        Some(((n as i32) << 2) as u32 | 0x02)
    } else {
        None
    }
}

fn xlsb_sheet(rows: &[Vec<V>], strings: &[&str], truncated: bool) -> Vec<u8> {
    let mut out = Vec::new();
    record(&mut out, 0x0081, &[]); // BrtBeginSheet
    record(&mut out, 0x0094, &[0; 16]); // BrtWsDim
    record(&mut out, 0x0091, &[]); // BrtBeginSheetData
    for (r, row) in Book::cells(rows) {
        let mut hdr = r.to_le_bytes().to_vec();
        hdr.resize(17, 0);
        record(&mut out, 0x0000, &hdr); // BrtRowHdr
        for (c, v) in row.iter().enumerate() {
            let style: u32 = if matches!(v, V::Date(_) | V::Blank) { 1 } else { 0 };
            let mut data = (c as u32).to_le_bytes().to_vec();
            data.extend_from_slice(&style.to_le_bytes());
            let typ = match v {
                V::Num(n) => match rk_integer(*n) {
                    Some(rk) => {
                        data.extend_from_slice(&rk.to_le_bytes());
                        0x0002
                    }
                    None => {
                        data.extend_from_slice(&n.to_le_bytes());
                        0x0005
                    }
                },
                V::Str(s) => {
                    let idx = strings.iter().position(|x| x == s).unwrap() as u32;
                    data.extend_from_slice(&idx.to_le_bytes());
                    0x0007
                }
                V::Bool(b) => {
                    data.push(*b as u8);
                    0x0004
                }
                V::Err(e) => {
                    data.push(error_code(e));
                    0x0003
                }
                V::Date(n) => {
                    data.extend_from_slice(&n.to_le_bytes());
                    0x0005
                }
                V::FormulaNum(n) => {
                    data.extend_from_slice(&n.to_le_bytes());
                    data.extend_from_slice(&[0; 10]); // grbit, empty CellParsedFormula
                    0x0009
                }
                V::FormulaStr(s) => {
                    data.extend(wide(s));
                    data.extend_from_slice(&[0; 10]);
                    0x0008
                }
                V::FormulaEmpty => {
                    data.extend(wide(""));
                    data.extend_from_slice(&[0; 10]);
                    0x0008
                }
                V::Blank => 0x0001,
                V::Skip => continue,
            };
            record(&mut out, typ, &data);
        }
    }
    if !truncated {
        record(&mut out, 0x0092, &[]); // BrtEndSheetData
        record(&mut out, 0x0082, &[]); // BrtEndSheet
    }
    out
}

/// BIFF8 record: u16 type, u16 length
fn biff(out: &mut Vec<u8>, typ: u16, data: &[u8]) {
    out.extend_from_slice(&typ.to_le_bytes());
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(data);
}

fn bof(dt: u16) -> Vec<u8> {
    let mut data = 0x0600u16.to_le_bytes().to_vec();
    data.extend_from_slice(&dt.to_le_bytes());
    data.extend_from_slice(&[0; 12]);
    data
}

fn xls_xf(ifmt: u16) -> Vec<u8> {
    let mut data = vec![0u8; 20];
    data[2..4].copy_from_slice(&ifmt.to_le_bytes());
    data
}

/// Flags byte then characters, compressed when every char is latin-1
fn xls_chars(s: &str) -> Vec<u8> {
    if s.chars().all(|c| (c as u32) < 0x100) {
        let mut out = vec![0x00];
        out.extend(s.chars().map(|c| c as u8));
        out
    } else {
        let mut out = vec![0x01];
        for c in s.encode_utf16() {
            out.extend_from_slice(&c.to_le_bytes());
        }
        out
    }
}

fn xls_cell_header(r: u32, c: usize, xf: u16) -> Vec<u8> {
    let mut data = (r as u16).to_le_bytes().to_vec();
    data.extend_from_slice(&(c as u16).to_le_bytes());
    data.extend_from_slice(&xf.to_le_bytes());
    data
}

fn xls_sheet(rows: &[Vec<V>], strings: &[&str], truncated: bool) -> Vec<u8> {
    let mut out = Vec::new();
    biff(&mut out, 0x0809, &bof(0x0010));
    for (r, row) in Book::cells(rows) {
        for (c, v) in row.iter().enumerate() {
            let xf = if matches!(v, V::Date(_) | V::Blank) { 1 } else { 0 };
            let mut data = xls_cell_header(r, c, xf);
            match v {
                V::Num(n) => match rk_integer(*n) {
                    Some(rk) => {
                        data.extend_from_slice(&rk.to_le_bytes());
                        biff(&mut out, 0x027E, &data);
                    }
                    None => {
                        data.extend_from_slice(&n.to_le_bytes());
                        biff(&mut out, 0x0203, &data);
                    }
                },
                V::Str(s) => {
                    let idx = strings.iter().position(|x| x == s).unwrap() as u32;
                    data.extend_from_slice(&idx.to_le_bytes());
                    biff(&mut out, 0x00FD, &data);
                }
                V::Bool(b) => {
                    data.extend_from_slice(&[*b as u8, 0]);
                    biff(&mut out, 0x0205, &data);
                }
                V::Err(e) => {
                    data.extend_from_slice(&[error_code(e), 1]);
                    biff(&mut out, 0x0205, &data);
                }
                V::Date(n) => {
                    data.extend_from_slice(&n.to_le_bytes());
                    biff(&mut out, 0x0203, &data);
                }
                V::FormulaNum(n) => {
                    data.extend_from_slice(&n.to_le_bytes());
                    data.extend_from_slice(&[0; 8]); // grbit, chn, empty rgce
                    biff(&mut out, 0x0006, &data);
                }
                V::FormulaStr(s) => {
                    data.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0xFF, 0xFF]);
                    data.extend_from_slice(&[0; 8]);
                    biff(&mut out, 0x0006, &data);
                    let mut string = (s.encode_utf16().count() as u16).to_le_bytes().to_vec();
                    string.extend(xls_chars(s));
                    biff(&mut out, 0x0207, &string);
                }
                V::FormulaEmpty => {
                    data.extend_from_slice(&[0x03, 0, 0, 0, 0, 0, 0xFF, 0xFF]);
                    data.extend_from_slice(&[0; 8]);
                    biff(&mut out, 0x0006, &data);
                }
                V::Blank => biff(&mut out, 0x0201, &data),
                V::Skip => (),
            }
        }
    }
    if !truncated {
        biff(&mut out, 0x000A, &[]);
    }
    out
}

/// v3 compound file header with no fat, no difat sector and no directory
pub fn cfb_header() -> Vec<u8> {
    let mut data = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    data.resize(512, 0);
    data[26..28].copy_from_slice(&3u16.to_le_bytes());
    data[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
    data[30..32].copy_from_slice(&9u16.to_le_bytes());
    data[32..34].copy_from_slice(&6u16.to_le_bytes());
    data[48..52].copy_from_slice(&0xFFFF_FFFEu32.to_le_bytes());
    data[56..60].copy_from_slice(&4096u32.to_le_bytes());
    data[60..64].copy_from_slice(&0xFFFF_FFFEu32.to_le_bytes());
    data[68..72].copy_from_slice(&0xFFFF_FFFEu32.to_le_bytes());
    data[76..].fill(0xFF);
    data
}
