use criterion::{Criterion, criterion_group, criterion_main};
use kahu_xml::{DocumentBuilder, doc, elem, text};
use kahu_xpath::{compile, evaluate};
use std::hint::black_box;

fn sample_document() -> std::rc::Rc<kahu_xml::Document> {
    let mut builder: DocumentBuilder = doc();
    let mut root = elem("library");
    for index in 0..200 {
        root = root.child(
            elem("book")
                .attr("id", &index.to_string())
                .child(elem("title").child(text(&format!("Title {index}")))),
        );
    }
    builder = builder.child(root);
    builder.build()
}

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_path_query", |b| {
        b.iter(|| compile(black_box("/library/book[@id='42']/title")).unwrap());
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let document = sample_document();
    let by_attribute = compile("/library/book[@id='42']/title").unwrap();
    let flwor = compile(
        "for $b in /library/book where $b/@id < 10 order by $b/@id descending return $b/title",
    )
    .unwrap();

    c.bench_function("evaluate_attribute_predicate", |b| {
        b.iter(|| evaluate(black_box(&by_attribute), &document, 0).unwrap());
    });
    c.bench_function("evaluate_flwor_pipeline", |b| {
        b.iter(|| evaluate(black_box(&flwor), &document, 0).unwrap());
    });
}

criterion_group!(benches, bench_compile, bench_evaluate);
criterion_main!(benches);
