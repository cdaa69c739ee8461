use blockwork_engine::{BlockConfig, DataMap, Layout, RenderError, Renderer, placeholder};
use criterion::{Criterion, criterion_group, criterion_main};

struct BodyRenderer;

impl Renderer for BodyRenderer {
    fn render(&self, _template: Option<&str>, _data: &DataMap) -> Result<String, RenderError> {
        Ok(String::new())
    }
}

/// Build a layout with `width` sections under the root, each displaying
/// `depth` nested sub-blocks.
fn build_layout(width: usize, depth: usize) -> Layout {
    let mut layout = Layout::new(Box::new(BodyRenderer));
    let mut root_body = String::from("<html>");
    for w in 0..width {
        root_body.push_str(&placeholder(&format!("section-{w}")));
    }
    root_body.push_str("</html>");
    layout.set(
        "root",
        BlockConfig {
            body: Some(root_body),
            ..BlockConfig::default()
        },
    );
    for w in 0..width {
        let root = layout.get_or_create("root");
        root.register_displayed_block(format!("section-{w}"), true);
        for d in 0..depth {
            let id = format!("section-{w}-{d}");
            let parent = if d == 0 {
                format!("section-{w}")
            } else {
                format!("section-{w}-{}", d - 1)
            };
            let body = format!("<div>{}</div>", placeholder(&id));
            layout.set(
                &parent,
                BlockConfig {
                    body: Some(body),
                    ..BlockConfig::default()
                },
            );
            layout
                .get_or_create(&parent)
                .register_displayed_block(&id, true);
            layout.set(
                &id,
                BlockConfig {
                    body: Some(format!("<p>block {id}</p>")),
                    ..BlockConfig::default()
                },
            );
        }
    }
    layout
}

fn bench_render_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    group.sample_size(20);

    group.bench_function("wide_shallow", |b| {
        b.iter(|| {
            let mut layout = std::hint::black_box(build_layout(50, 1));
            std::hint::black_box(layout.render().unwrap());
        });
    });

    group.bench_function("narrow_deep", |b| {
        b.iter(|| {
            let mut layout = std::hint::black_box(build_layout(2, 40));
            std::hint::black_box(layout.render().unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_render_cascade);
criterion_main!(benches);
