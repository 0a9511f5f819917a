//! Transcribe a local media file and print the text.
//!
//! Usage: cargo run --example basic -- path/to/video.mp4

#[tokio::main]
async fn main() -> vidscribe::Result<()> {
    let path = std::env::args()
        .nth(1)
        .expect("usage: basic <media-file>");

    let session = vidscribe::transcribe_file(&path).await?;

    println!("{}", session.text());

    Ok(())
}
