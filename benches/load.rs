use criterion::{Criterion, criterion_group, criterion_main};
use envfile::{EnvLoader, MemoryEnv, SubstitutionMode};
use tempfile::TempDir;

fn bench_load(c: &mut Criterion) {
    let dir = TempDir::new().expect("temp dir");
    let env_path = dir.path().join(".env");
    std::fs::write(&env_path, make_env_content(2_000)).expect("failed to write test file");

    c.bench_function("load_in_memory", |b| {
        b.iter(|| {
            EnvLoader::new()
                .path(&env_path)
                .overwrite(true)
                .load(&mut MemoryEnv::new())
                .expect("load should succeed")
        });
    });

    c.bench_function("load_in_memory_expand", |b| {
        b.iter(|| {
            EnvLoader::new()
                .path(&env_path)
                .overwrite(true)
                .substitution_mode(SubstitutionMode::Expand)
                .load(&mut MemoryEnv::new())
                .expect("load should succeed")
        });
    });
}

fn make_env_content(entries: usize) -> String {
    let mut content = String::with_capacity(entries * 24);
    for idx in 0..entries {
        content.push_str("KEY_");
        content.push_str(&idx.to_string());
        content.push('=');
        if idx > 0 {
            content.push_str("${KEY_0}/");
        }
        content.push_str("value");
        content.push('\n');
    }
    content
}

criterion_group!(benches, bench_load);
criterion_main!(benches);
