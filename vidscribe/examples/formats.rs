//! Output a transcript as SRT, WebVTT, and JSON.
//!
//! Usage: cargo run --example formats -- path/to/video.mp4

#[tokio::main]
async fn main() -> vidscribe::Result<()> {
    let path = std::env::args()
        .nth(1)
        .expect("usage: formats <media-file>");

    let session = vidscribe::transcribe_file(&path).await?;

    println!("=== SRT ===\n{}", session.to_srt());
    println!("=== WebVTT ===\n{}", session.to_vtt());
    println!("=== JSON ===\n{}", session.to_json_pretty()?);

    Ok(())
}
