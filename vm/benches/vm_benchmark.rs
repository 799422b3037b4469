use criterion::{Criterion, black_box, criterion_group, criterion_main};
use parser::ast::Program;
use vm::{Compiler, Globals, VM};

const FIBONACCI: &str = "
let fibonacci = fn(x) {
    if (x == 0) {
        0
    } else {
        if (x == 1) {
            return 1;
        } else {
            fibonacci(x - 1) + fibonacci(x - 2);
        }
    }
};
fibonacci(20);
";

fn parse_source(src: &str) -> Program {
    parser::parse(src).expect("parse error")
}

fn bench_fibonacci(c: &mut Criterion) {
    let program = parse_source(FIBONACCI);
    let mut compiler = Compiler::new();
    compiler.compile(&program).expect("compile");
    let bytecode = compiler.bytecode();

    c.bench_function("fibonacci_20", |b| {
        b.iter(|| {
            let mut globals = Globals::new();
            let mut vm = VM::new(bytecode.clone(), &mut globals);
            vm.run().expect("run");
            black_box(vm.last_popped().clone());
        })
    });
}

fn bench_compile(c: &mut Criterion) {
    let mut source = String::from(FIBONACCI);
    for i in 0..100 {
        source.push_str(&format!(
            "let f{i} = fn(a, b) {{ let c = a + b; fn(d) {{ if (d > c) {{ [d, c] }} else {{ {{\"k\": c}} }} }} }};\n"
        ));
    }
    let program = parse_source(&source);

    c.bench_function("compile_only", |b| {
        b.iter(|| {
            let mut compiler = Compiler::new();
            compiler.compile(&program).expect("compile");
            black_box(compiler.bytecode());
        })
    });
}

criterion_group!(benches, bench_fibonacci, bench_compile);
criterion_main!(benches);
