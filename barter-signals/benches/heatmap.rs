use barter_signals::{
    Candle, HeatmapConfig, LiquidationEvent, LiquidationSide, OpenInterestPoint, PriceRange,
    build_combined_heatmap, build_liquidation_heatmap, build_oi_heatmap,
};
use chrono::{DateTime, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use smol_str::SmolStr;

const FIVE_MINUTES: i64 = 5 * 60 * 1000;

fn timestamp(index: usize) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000 + index as i64 * FIVE_MINUTES)
        .unwrap_or_default()
}

fn create_candles(len: usize) -> Vec<Candle> {
    (0..len)
        .map(|i| {
            let close = 60_000.0 + 1_500.0 * (i as f64 / 40.0).sin();
            Candle::new(timestamp(i), close, close + 40.0, close - 40.0, close, 10.0)
        })
        .collect()
}

fn create_open_interest(len: usize) -> Vec<OpenInterestPoint> {
    (0..len)
        .map(|i| OpenInterestPoint::new("BTCUSDT", timestamp(i), 80_000.0 + 25.0 * i as f64))
        .collect()
}

fn create_liquidations(candles: &[Candle]) -> Vec<LiquidationEvent> {
    candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            let side = if i % 2 == 0 {
                LiquidationSide::Long
            } else {
                LiquidationSide::Short
            };
            LiquidationEvent::new(
                SmolStr::new(format!("liq-{i}")),
                SmolStr::new_static("BTCUSDT"),
                side,
                candle.low,
                0.5 + (i % 7) as f64,
                candle.timestamp,
            )
        })
        .collect()
}

fn bench_heatmaps(c: &mut Criterion) {
    let mut group = c.benchmark_group("heatmap");
    let config = HeatmapConfig::default();

    // 1 day, 1 week and 30 days of 5 minute data
    for len in [288, 2_016, 8_640] {
        let candles = create_candles(len);
        let open_interest = create_open_interest(len);
        let liquidations = create_liquidations(&candles);
        let range = PriceRange::new(58_400.0, 61_600.0);

        group.throughput(Throughput::Elements(len as u64));

        group.bench_with_input(BenchmarkId::new("open_interest", len), &len, |b, _| {
            b.iter(|| build_oi_heatmap(black_box(&open_interest), black_box(&candles), &config))
        });

        group.bench_with_input(BenchmarkId::new("liquidations", len), &len, |b, _| {
            b.iter(|| build_liquidation_heatmap(black_box(&liquidations), range, &config))
        });

        let Ok(oi_heatmap) = build_oi_heatmap(&open_interest, &candles, &config) else {
            continue;
        };
        let Ok(liquidation_heatmap) = build_liquidation_heatmap(&liquidations, range, &config)
        else {
            continue;
        };

        group.bench_with_input(BenchmarkId::new("combined", len), &len, |b, _| {
            b.iter(|| {
                build_combined_heatmap(
                    black_box(&oi_heatmap),
                    black_box(&liquidation_heatmap),
                    &candles,
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_heatmaps);
criterion_main!(benches);
