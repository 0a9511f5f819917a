//! Transcribe with a custom model, language, and segment length.
//!
//! Usage: cargo run --example options -- path/to/video.mp4

use vidscribe::{Model, PipelineOptions, SegmentEntry};

#[tokio::main]
async fn main() -> vidscribe::Result<()> {
    let path = std::env::args()
        .nth(1)
        .expect("usage: options <media-file>");

    let opts = PipelineOptions::new()
        .model(Model::Small)
        .segment_secs(15.0)
        .beam_size(5)
        .language("en")?;

    let session = vidscribe::transcribe_file_with_options(&path, &opts).await?;

    for seg in session.segments() {
        match session.entry(seg.index) {
            Some(SegmentEntry::Recognized { text, words }) => {
                println!("[{:.1}s - {:.1}s] {text}", seg.start_secs, seg.end_secs());
                for word in words {
                    println!("    {:.2}s  {}", word.start, word.text);
                }
            }
            Some(SegmentEntry::Empty) => {
                println!("[{:.1}s - {:.1}s] (silence)", seg.start_secs, seg.end_secs());
            }
            Some(SegmentEntry::Failed { reason, .. }) => {
                println!("[{:.1}s - {:.1}s] failed: {reason}", seg.start_secs, seg.end_secs());
            }
            None => {}
        }
    }

    Ok(())
}
