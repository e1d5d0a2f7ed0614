#[cfg(test)]
mod benchmarks {
    use shared::image::{max_pixel_dimension, thumbnail_dimensions};
    use std::time::Instant;

    #[test]
    fn benchmark_thumbnail_dimensions() {
        let iterations = 10000;
        let start = Instant::now();

        for i in 0..iterations {
            let width = 1920 + (i % 100);
            let height = 1080 + (i % 50);
            let _dims = thumbnail_dimensions(width, height, 256);
        }

        let elapsed = start.elapsed();
        let avg_time = elapsed.as_micros() / iterations as u128;

        println!(
            "Thumbnail dimensions: {} iterations in {:?}",
            iterations, elapsed
        );

        assert!(
            avg_time < 100,
            "Thumbnail dimension calculation too slow: {} μs",
            avg_time
        );
    }

    #[test]
    fn benchmark_max_pixel_dimension() {
        let iterations = 100000;
        let start = Instant::now();

        for i in 0..iterations {
            let _max = max_pixel_dimension(i as f64, (i / 2) as f64, 2.0);
        }

        let elapsed = start.elapsed();
        let avg_time = elapsed.as_nanos() / iterations as u128;

        println!("Average time per calculation: {} nanoseconds", avg_time);

        assert!(
            avg_time < 1000,
            "Pixel dimension calculation too slow: {} ns",
            avg_time
        );
    }
}
