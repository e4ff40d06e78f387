use criterion::{black_box, criterion_group, criterion_main, Criterion};
use eth_exposure::decimals::{eth_to_usd, sum_usd, wei_to_eth, EthPrice};
use rand::Rng;

fn random_wei(rng: &mut impl Rng) -> String {
    // Up to ~10^6 ETH
    let whole: u64 = rng.gen_range(0..1_000_000);
    let fraction: u64 = rng.gen_range(0..1_000_000_000_000_000_000);
    format!("{whole}{fraction:018}")
}

fn conversion_benchmark(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let balances: Vec<String> = (0..100).map(|_| random_wei(&mut rng)).collect();
    let price = EthPrice::parse("3456.78").expect("valid price");

    c.bench_function("wei_to_eth", |b| {
        b.iter(|| {
            for wei in &balances {
                black_box(wei_to_eth(black_box(wei)).unwrap());
            }
        })
    });

    let eth: Vec<String> = balances.iter().map(|wei| wei_to_eth(wei).unwrap()).collect();
    c.bench_function("eth_to_usd", |b| {
        b.iter(|| {
            for amount in &eth {
                black_box(eth_to_usd(black_box(amount), &price).unwrap());
            }
        })
    });

    let usd: Vec<String> = eth.iter().map(|amount| eth_to_usd(amount, &price).unwrap()).collect();
    c.bench_function("sum_usd", |b| b.iter(|| black_box(sum_usd(black_box(&usd)).unwrap())));
}

criterion_group!(benches, conversion_benchmark);
criterion_main!(benches);
