//! These benches convert a directory of synthetic Biblica books, covering the
//! merge, transform and reposition stages, and transform a bible-sized USX
//! document whose markers are all siblings.

#![allow(missing_docs)]

use std::{fmt::Write as _, fs, path::Path};

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use step_osis::{xml::Document, Assembler, ConversionRequest, Dialect, StylesheetSource};
use tempfile::TempDir;

/// Writes `books` books of `chapters` chapters, each with a heading before
/// every fifth verse.
fn preseed_directory(path: &Path, books: usize, chapters: usize) {
    for b in 1..=books {
        let mut xml = format!(
            r#"<biblicaDocument work="BENCH" lang="en" title="Bench"><scripture><book id="B{b:02}">"#
        );
        for c in 1..=chapters {
            write!(xml, r#"<chapter number="{c}"><para>"#).unwrap();
            for v in 1..=30 {
                if v % 5 == 1 {
                    write!(xml, "<heading>Section {v}</heading>").unwrap();
                }
                write!(xml, r#"<verse number="{v}">Verse text {v}</verse>"#).unwrap();
            }
            xml.push_str("</para></chapter>");
        }
        xml.push_str("</book></scripture></biblicaDocument>");
        fs::write(path.join(format!("{b:02}.xml")), xml).unwrap();
    }
}

fn assemble(c: &mut Criterion) {
    let assembler = Assembler::default();

    c.bench_function("assemble 10 books", |b| {
        b.iter_batched(
            || {
                let tmp_dir = TempDir::new().unwrap();
                let src = tmp_dir.path().join("src");
                fs::create_dir(&src).unwrap();
                preseed_directory(&src, 10, 10);
                tmp_dir
            },
            |tmp_dir| {
                let request = ConversionRequest::new(
                    tmp_dir.path().join("src"),
                    tmp_dir.path().join("out.xml"),
                    Dialect::Biblica,
                )
                .unwrap();
                assembler.convert(&request, &mut |_| {}).unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

/// A USX bible keeps every book, chapter and verse under the one `usx` node.
fn flat_usx(books: usize, chapters: usize, verses: usize) -> String {
    let mut xml = String::from(r#"<usx version="3.0">"#);
    for b in 1..=books {
        write!(xml, r#"<book code="B{b:02}"/>"#).unwrap();
        for c in 1..=chapters {
            write!(xml, r#"<chapter number="{c}"/><para style="s1">Heading</para>"#).unwrap();
            for v in 1..=verses {
                write!(xml, r#"<para style="p"><verse number="{v}"/>text</para>"#).unwrap();
            }
        }
    }
    xml.push_str("</usx>");
    xml
}

fn transform_usx(c: &mut Criterion) {
    let source = Document::parse(&flat_usx(66, 18, 27)).unwrap();
    let stylesheet = StylesheetSource::Bundled.load(Dialect::Usx).unwrap();

    c.bench_function("transform usx bible", |b| {
        b.iter(|| stylesheet.transform(&source).unwrap());
    });
}

criterion_group!(benches, assemble, transform_usx);
criterion_main!(benches);
