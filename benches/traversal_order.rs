use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rpg_forge::domain::models::{Edge, EdgeType, Graph, Node};
use rpg_forge::services::Scheduler;

/// `modules` modules, each with 10 components of 10 functions. Every
/// function feeds the next one in its component.
fn layered_plan(modules: usize) -> Graph {
    let mut graph = Graph::new();
    for m in 0..modules {
        let module_id = format!("m{m}");
        graph.add_node(Node::module(module_id.as_str(), module_id.as_str())).unwrap();
        for c in 0..10 {
            let component_id = format!("m{m}c{c}");
            graph
                .add_node(Node::component(component_id.as_str(), component_id.as_str()))
                .unwrap();
            graph
                .add_edge(Edge::new(module_id.as_str(), component_id.as_str(), EdgeType::Hierarchy).unwrap())
                .unwrap();
            for f in 0..10 {
                let function_id = format!("m{m}c{c}f{f}");
                graph
                    .add_node(Node::function(function_id.as_str(), function_id.as_str()))
                    .unwrap();
                graph
                    .add_edge(
                        Edge::new(component_id.as_str(), function_id.as_str(), EdgeType::Hierarchy)
                            .unwrap(),
                    )
                    .unwrap();
                if f > 0 {
                    let previous = format!("m{m}c{c}f{}", f - 1);
                    graph
                        .add_edge(Edge::new(previous, function_id.as_str(), EdgeType::DataFlow).unwrap())
                        .unwrap();
                }
            }
        }
    }
    graph
}

fn bench_traversal(c: &mut Criterion) {
    let mut group = c.benchmark_group("traversal");
    for modules in [1usize, 5, 20] {
        let graph = layered_plan(modules);
        group.bench_with_input(BenchmarkId::new("compute_order", modules), &graph, |b, graph| {
            b.iter(|| Scheduler::new(black_box(graph)).compute_order().unwrap());
        });
        let scheduler = Scheduler::new(&graph);
        group.bench_with_input(
            BenchmarkId::new("generation_order", modules),
            &scheduler,
            |b, scheduler| b.iter(|| black_box(scheduler).compute_generation_order().unwrap()),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_traversal);
criterion_main!(benches);
