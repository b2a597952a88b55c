use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tiki_taka::config::SessionConfig;
use tiki_taka::dispatch::{RateLimiter, RetryPolicy};
use tiki_taka::email_templates::{
    CustomTemplate, ResponseLinks, SessionDetails, WeeklyInvitationTemplate,
};
use time::macros::date;

fn session() -> SessionDetails {
    SessionDetails::new(&SessionConfig::default(), date!(2025 - 06 - 04))
}

fn benchmark_template_rendering(c: &mut Criterion) {
    let template = WeeklyInvitationTemplate {
        player_name: "Kasper".to_string(),
        session: session(),
        links: ResponseLinks::new("https://tikitaka.example.org", "0b6f3f0e-5c1e-4a57"),
    };

    // First render pays for SCSS compilation.
    let _ = template.render_html();

    c.bench_function("weekly_invitation_html", |b| {
        b.iter(|| black_box(template.render_html()));
    });

    c.bench_function("weekly_invitation_text", |b| {
        b.iter(|| black_box(template.render_text()));
    });

    c.bench_function("custom_message_with_links", |b| {
        b.iter(|| {
            let template = CustomTemplate::new(
                black_box("Sofie".to_string()),
                session(),
                black_box("Pitch moved indoors.\n\nBring indoor shoes.\n\nSee you!"),
                Some(ResponseLinks::new("https://tikitaka.example.org", "tok")),
            );
            black_box(template.render_html())
        });
    });
}

fn benchmark_backoff(c: &mut Criterion) {
    let policy = RetryPolicy {
        max_retries: 5,
        initial_backoff: Duration::from_millis(600),
        max_backoff: Duration::from_secs(30),
        max_jitter: Duration::from_millis(250),
    };

    c.bench_function("backoff_schedule", |b| {
        b.iter(|| {
            for retry in 0..=policy.max_retries {
                black_box(policy.backoff(black_box(retry)));
            }
        });
    });
}

fn benchmark_rate_limiter(c: &mut Criterion) {
    let limiter = Arc::new(RateLimiter::in_memory(Duration::from_millis(1000), 3));
    let mut now = 0i64;

    c.bench_function("rate_limiter_mark_and_status", |b| {
        b.iter(|| {
            now += 400;
            limiter.mark_request(black_box(now));
            black_box(limiter.status(now))
        });
    });
}

criterion_group!(
    benches,
    benchmark_template_rendering,
    benchmark_backoff,
    benchmark_rate_limiter
);
criterion_main!(benches);
