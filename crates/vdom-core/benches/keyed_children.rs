use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vdom_core::{h, Element, FunctionComponent, MemoryApplier, NodeId, Props, Renderer, RenderResult};
use vdom_macros::component;

const ROW_SAMPLES: &[usize] = &[10, 100, 1000];

#[component]
fn Row(props: &Props) -> RenderResult {
    let id = props.get_int("id").unwrap_or_default();
    Ok(h("li")
        .prop("className", "row")
        .child(format!("Item {id}"))
        .into())
}

fn list(order: &[usize]) -> Element {
    h("ul").children(order.iter().map(|&id| Row.element().key(id).prop("id", id)))
}

struct ListFixture {
    renderer: Renderer<MemoryApplier>,
    root: NodeId,
    order: Vec<usize>,
}

impl ListFixture {
    fn new(rows: usize) -> Self {
        let mut applier = MemoryApplier::new();
        let root = applier.create_root("root");
        Self {
            renderer: Renderer::new(applier),
            root,
            order: (0..rows).collect(),
        }
    }

    fn render(&mut self) {
        self.renderer
            .render(list(&self.order), self.root)
            .expect("render");
        self.renderer.applier_mut().clear_ops();
    }
}

fn bench_mount(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_mount");
    for &rows in ROW_SAMPLES {
        group.bench_with_input(BenchmarkId::new("rows", rows), &rows, |b, &rows| {
            b.iter(|| {
                let mut fixture = ListFixture::new(rows);
                fixture.render();
                black_box(fixture.renderer.record_count());
            });
        });
    }
    group.finish();
}

fn bench_rotate(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_rotate");
    for &rows in ROW_SAMPLES {
        group.bench_with_input(BenchmarkId::new("rows", rows), &rows, |b, &rows| {
            let mut fixture = ListFixture::new(rows);
            fixture.render();
            b.iter(|| {
                fixture.order.rotate_right(1);
                fixture.render();
            });
        });
    }
    group.finish();
}

fn bench_swap_ends(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_swap_ends");
    for &rows in ROW_SAMPLES {
        group.bench_with_input(BenchmarkId::new("rows", rows), &rows, |b, &rows| {
            let mut fixture = ListFixture::new(rows);
            fixture.render();
            b.iter(|| {
                let last = fixture.order.len() - 1;
                fixture.order.swap(0, last);
                fixture.render();
            });
        });
    }
    group.finish();
}

criterion_group!(keyed_children, bench_mount, bench_rotate, bench_swap_ends);
criterion_main!(keyed_children);
