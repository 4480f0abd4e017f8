use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rpmsack::{Nevra, NevraForm, Reldep};

const NEVRAS: &[&str] = &[
    "bash-5.2-3.fc39.x86_64",
    "kernel-6.8.5-201.fc39.x86_64",
    "1:glibc-devel-2.38-15.fc39.i686",
    "pkgconfig-2.0-1.fc39.noarch",
];

const RELDEPS: &[&str] = &[
    "pkgconfig(glibc)",
    "libc.so.6(GLIBC_2.34)(64bit)",
    "bash >= 5.0",
    "/usr/bin/env",
];

const FORMS: &[NevraForm] = &[
    NevraForm::Nevra,
    NevraForm::Nevr,
    NevraForm::Nev,
    NevraForm::Na,
    NevraForm::Name,
];

fn bench_nevra_parse(c: &mut Criterion) {
    c.bench_function("nevra_parse_form", |b| {
        b.iter(|| {
            for s in NEVRAS {
                black_box(Nevra::parse_form(black_box(s), NevraForm::Nevra));
            }
        })
    });

    c.bench_function("nevra_parse_possibilities", |b| {
        b.iter(|| {
            for s in NEVRAS {
                black_box(Nevra::parse_possibilities(black_box(s), FORMS));
            }
        })
    });
}

fn bench_reldep_parse(c: &mut Criterion) {
    c.bench_function("reldep_parse", |b| {
        b.iter(|| {
            for s in RELDEPS {
                black_box(Reldep::parse(black_box(s)));
            }
        })
    });
}

criterion_group!(benches, bench_nevra_parse, bench_reldep_parse);
criterion_main!(benches);
