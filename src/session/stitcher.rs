use super::{ChunkTranscriptionResult, CoverageGap, FinalTranscript, Provider};
use crate::stt::TranscriptionSegment;
use chrono::Utc;
use std::collections::{HashMap, HashSet};

/// Segments starting this far before the previous segment's end are treated
/// as the same speech seen twice through a chunk overlap.
pub const OVERLAP_EPSILON_SECONDS: f64 = 0.5;

/// Job-level fields copied onto the merged transcript.
#[derive(Debug, Clone)]
pub struct MergeContext {
    pub job_id: String,
    pub language: String,
}

pub struct Stitcher;

impl Stitcher {
    pub fn merge(
        results: &HashMap<usize, ChunkTranscriptionResult>,
        total_duration: f64,
        context: &MergeContext,
    ) -> FinalTranscript {
        let mut indices: Vec<usize> = results.keys().copied().collect();
        indices.sort_unstable();

        let mut merged: Vec<TranscriptionSegment> = Vec::new();
        let mut gaps: Vec<CoverageGap> = Vec::new();
        let mut used: HashSet<Provider> = HashSet::new();
        let mut covered_until = 0.0f64;
        let mut replaced = 0usize;
        let mut dropped = 0usize;

        for index in indices {
            let Some(result) = results.get(&index) else {
                continue;
            };

            if let Some(error) = &result.error {
                gaps.push(CoverageGap {
                    chunk_index: result.chunk_index,
                    start_time: result.chunk.start_time,
                    end_time: result.chunk.end_time,
                    provider: result.provider,
                    error: error.clone(),
                });
                continue;
            }

            used.insert(result.provider);
            covered_until = covered_until.max(result.chunk.end_time);

            for segment in &result.segments {
                match merged.last_mut() {
                    Some(last)
                        if segment.start_seconds
                            < last.end_seconds - OVERLAP_EPSILON_SECONDS =>
                    {
                        if segment.confidence > last.confidence {
                            *last = segment.clone();
                            replaced += 1;
                        } else {
                            dropped += 1;
                        }
                    }
                    _ => merged.push(segment.clone()),
                }
            }
        }

        for (i, segment) in merged.iter_mut().enumerate() {
            segment.index = i;
        }

        let reported_duration = if total_duration > 0.0 {
            covered_until.min(total_duration)
        } else {
            covered_until
        };

        tracing::info!(
            "Merged {} chunks into {} segments ({} overlap replacements, {} duplicates dropped, {} gaps)",
            results.len(),
            merged.len(),
            replaced,
            dropped,
            gaps.len()
        );

        FinalTranscript {
            job_id: context.job_id.clone(),
            language: context.language.clone(),
            segments: merged,
            total_duration_seconds: reported_duration,
            model_identifier: model_identifier(&used),
            transcribed_at: Utc::now(),
            gaps,
        }
    }
}

fn model_identifier(used: &HashSet<Provider>) -> String {
    let tags: Vec<&str> = Provider::ALL
        .iter()
        .filter(|p| used.contains(p))
        .map(|p| p.model_tag())
        .collect();
    if tags.is_empty() {
        "parallel-none".to_string()
    } else {
        format!("parallel-{}", tags.join("+"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AudioChunk;

    fn ctx() -> MergeContext {
        MergeContext {
            job_id: "job-1".into(),
            language: "en".into(),
        }
    }

    fn seg(start: f64, end: f64, text: &str, confidence: f32) -> TranscriptionSegment {
        TranscriptionSegment::new(99, start, end, text, confidence)
    }

    fn ok(
        index: usize,
        start: f64,
        end: f64,
        provider: Provider,
        segments: Vec<TranscriptionSegment>,
    ) -> ChunkTranscriptionResult {
        ChunkTranscriptionResult::success(AudioChunk::new(index, start, end), provider, segments, 10)
    }

    fn failed(index: usize, start: f64, end: f64, provider: Provider) -> ChunkTranscriptionResult {
        ChunkTranscriptionResult::failure(
            AudioChunk::new(index, start, end),
            provider,
            "Request timeout",
            10,
        )
    }

    fn into_map(results: Vec<ChunkTranscriptionResult>) -> HashMap<usize, ChunkTranscriptionResult> {
        results.into_iter().map(|r| (r.chunk_index, r)).collect()
    }

    #[test]
    fn test_overlap_keeps_higher_confidence() {
        // Both chunks heard the speech in [25, 30].
        let results = into_map(vec![
            ok(
                1,
                25.0,
                55.0,
                Provider::FasterWhisper,
                vec![seg(26.0, 30.0, "overlap from b", 0.9), seg(31.0, 40.0, "next", 0.8)],
            ),
            ok(
                0,
                0.0,
                30.0,
                Provider::OpenAi,
                vec![seg(0.0, 24.0, "intro", 0.9), seg(25.0, 30.0, "overlap from a", 0.6)],
            ),
        ]);

        let transcript = Stitcher::merge(&results, 55.0, &ctx());
        let texts: Vec<&str> = transcript.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["intro", "overlap from b", "next"]);
        assert_eq!(
            transcript.segments.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(transcript.model_identifier, "parallel-openai+fasterwhisper");
        assert_eq!(transcript.total_duration_seconds, 55.0);
    }

    #[test]
    fn test_equal_confidence_keeps_earlier_segment() {
        let results = into_map(vec![
            ok(0, 0.0, 30.0, Provider::OpenAi, vec![seg(25.0, 30.0, "first", 0.7)]),
            ok(1, 25.0, 55.0, Provider::OpenAi, vec![seg(25.2, 30.0, "second", 0.7)]),
        ]);
        let transcript = Stitcher::merge(&results, 55.0, &ctx());
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.segments[0].text, "first");
        assert_eq!(transcript.model_identifier, "parallel-openai");
    }

    #[test]
    fn test_segments_within_epsilon_are_both_kept() {
        let results = into_map(vec![ok(
            0,
            0.0,
            30.0,
            Provider::FasterWhisper,
            vec![seg(0.0, 10.0, "a", 0.9), seg(9.6, 12.0, "b", 0.1)],
        )]);
        let transcript = Stitcher::merge(&results, 30.0, &ctx());
        assert_eq!(transcript.segments.len(), 2);
    }

    #[test]
    fn test_failed_chunk_becomes_gap() {
        let results = into_map(vec![
            ok(0, 0.0, 30.0, Provider::OpenAi, vec![seg(1.0, 5.0, "one", 0.9)]),
            ok(1, 25.0, 55.0, Provider::FasterWhisper, vec![seg(31.0, 35.0, "two", 0.9)]),
            failed(2, 50.0, 80.0, Provider::OpenAi),
            failed(3, 75.0, 95.0, Provider::FasterWhisper),
        ]);

        let transcript = Stitcher::merge(&results, 95.0, &ctx());
        assert_eq!(transcript.full_text(), "one two");
        assert_eq!(transcript.gaps.len(), 2);
        assert_eq!(transcript.gaps[0].chunk_index, 2);
        assert_eq!(transcript.gaps[0].start_time, 50.0);
        assert_eq!(transcript.gaps[1].provider, Provider::FasterWhisper);
        // Trailing chunks failed, so the transcript stops at chunk 1.
        assert_eq!(transcript.total_duration_seconds, 55.0);
        assert!(!transcript.is_complete());
    }

    #[test]
    fn test_all_failed_yields_empty_transcript() {
        let results = into_map(vec![
            failed(0, 0.0, 30.0, Provider::OpenAi),
            failed(1, 25.0, 40.0, Provider::FasterWhisper),
        ]);
        let transcript = Stitcher::merge(&results, 40.0, &ctx());
        assert!(transcript.segments.is_empty());
        assert_eq!(transcript.total_duration_seconds, 0.0);
        assert_eq!(transcript.model_identifier, "parallel-none");
        assert_eq!(transcript.job_id, "job-1");
    }

    #[test]
    fn test_output_is_sorted_regardless_of_insertion_order() {
        let mut results = Vec::new();
        for i in (0..10).rev() {
            let start = i as f64 * 28.0;
            results.push(ok(
                i,
                start,
                start + 30.0,
                Provider::OpenAi,
                vec![seg(start + 1.0, start + 20.0, &format!("chunk {}", i), 0.9)],
            ));
        }
        let transcript = Stitcher::merge(&into_map(results), 500.0, &ctx());
        assert_eq!(transcript.segments.len(), 10);
        for pair in transcript.segments.windows(2) {
            assert!(pair[0].start_seconds < pair[1].start_seconds);
            assert_eq!(pair[0].index + 1, pair[1].index);
        }
        assert_eq!(transcript.total_duration_seconds, 282.0);
    }
}
