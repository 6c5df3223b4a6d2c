//! Debug script to inspect a rendered 9xbuddy process page
//!
//! Usage: cargo run -p xbuddy-core --example debug_process_page -- <video-url>

use xbuddy_core::parser::{has_direct_button, parse_anchors, parse_formats};
use xbuddy_core::renderer::{BrowserSession, ChromiumRenderer, Renderer};
use xbuddy_core::{DebugLog, EventSink, LinkClassifier, ScraperConfig, build_process_url};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let video_url = std::env::args()
        .nth(1)
        .ok_or("usage: debug_process_page <video-url>")?;

    let config = ScraperConfig::default();
    let process_url = build_process_url(&config.process_base_url, &video_url);
    println!("Rendering {}\n", process_url);

    let renderer = ChromiumRenderer::from_config(&config);
    let mut session = renderer.launch(&config.user_agent, EventSink::disabled()).await?;

    session.navigate(&process_url).await?;
    let rendered = session
        .wait_for_selector(&config.rules.result_selector, config.render_timeout())
        .await?;
    tokio::time::sleep(config.settle()).await;
    let html = session.content().await?;
    xbuddy_core::renderer::release(session, &DebugLog::discard()).await;

    // Save HTML to file for inspection
    std::fs::write("debug_process.html", &html)?;
    println!("HTML saved to debug_process.html (results rendered: {})", rendered);

    let rules = &config.rules;
    let formats = parse_formats(&html, rules)?;
    println!("Formats: {:?}, 480p present: {}", formats.formats, formats.has_resolution_hint);
    println!("Direct button: {}", has_direct_button(&html, rules)?);

    let anchors = parse_anchors(&html, rules)?;
    println!("\n=== {} anchors ===", anchors.len());
    for anchor in &anchors {
        println!("{} | {}", anchor.href, anchor.parent_text.trim());
    }

    let classifier = LinkClassifier::new(rules)?;
    let candidates = classifier.classify(&anchors);
    println!("\n=== {} candidates ===", candidates.len());
    for candidate in candidates.iter() {
        println!("{:?}: {}", candidate.bucket, candidate.url);
    }

    Ok(())
}
