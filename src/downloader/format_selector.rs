// FormatSelector - turns yt-dlp's raw format list into a UI menu
//
// Handles:
// - Classification (video+audio, video only, audio only)
// - Stable de-duplication (first descriptor per key wins)
// - Grouped ordering with a synthetic "best" entry in front
// - Label and size formatting

use std::collections::HashSet;

use super::models::{EncodingDescriptor, FormatKind, FormatOption, BEST_FORMAT_ID};

const BEST_LABEL: &str = "Melhor Qualidade (Automático)";
const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Format selector with grouping and de-duplication
pub struct FormatSelector;

impl FormatSelector {
    /// Build the format menu from raw descriptors.
    ///
    /// Never returns an empty list: the "best" entry is always first, even
    /// when `raw` is empty or missing.
    pub fn normalize(raw: Option<&[EncodingDescriptor]>) -> Vec<FormatOption> {
        let mut combined = Vec::new();
        let mut video = Vec::new();
        let mut audio = Vec::new();
        let mut seen = HashSet::new();

        for descriptor in raw.unwrap_or_default() {
            let Some(id) = descriptor.format_id.as_deref().filter(|id| !id.is_empty()) else {
                continue;
            };
            let Some(kind) = Self::classify(descriptor) else {
                continue;
            };

            let option = Self::build_option(id, kind, descriptor);
            if !seen.insert(Self::dedup_key(&option)) {
                continue;
            }

            match kind {
                FormatKind::CombinedAV => combined.push(option),
                FormatKind::VideoOnly => video.push(option),
                FormatKind::AudioOnly => audio.push(option),
                FormatKind::Best => {}
            }
        }

        let mut options = Vec::with_capacity(1 + combined.len() + video.len() + audio.len());
        options.push(Self::best_option());
        options.extend(combined);
        options.extend(video);
        options.extend(audio);
        options
    }

    /// The synthetic "let yt-dlp decide" entry
    pub fn best_option() -> FormatOption {
        FormatOption {
            id: BEST_FORMAT_ID.to_string(),
            kind: FormatKind::Best,
            label: BEST_LABEL.to_string(),
            container_ext: "mp4".to_string(),
            height: None,
            width: None,
            frame_rate: None,
            audio_bitrate_kbps: None,
            byte_size: None,
            size_label: None,
        }
    }

    fn classify(descriptor: &EncodingDescriptor) -> Option<FormatKind> {
        match (descriptor.has_video(), descriptor.has_audio()) {
            (true, true) => Some(FormatKind::CombinedAV),
            (true, false) => Some(FormatKind::VideoOnly),
            (false, true) => Some(FormatKind::AudioOnly),
            (false, false) => None,
        }
    }

    fn build_option(id: &str, kind: FormatKind, d: &EncodingDescriptor) -> FormatOption {
        // The defaulted ext is also the dedup key, so a missing ext collides
        // with an explicit mp4/m4a of the same height or bitrate
        let default_ext = match kind {
            FormatKind::AudioOnly => "m4a",
            FormatKind::Best | FormatKind::CombinedAV | FormatKind::VideoOnly => "mp4",
        };
        let container_ext = d
            .ext
            .as_deref()
            .filter(|ext| !ext.is_empty())
            .unwrap_or(default_ext)
            .to_string();

        let is_audio = kind == FormatKind::AudioOnly;
        let mut option = FormatOption {
            id: id.to_string(),
            kind,
            label: String::new(),
            container_ext,
            height: if is_audio { None } else { Some(d.height.unwrap_or(0)) },
            width: if is_audio { None } else { d.width },
            frame_rate: if is_audio { None } else { d.fps },
            audio_bitrate_kbps: if is_audio { d.abr.filter(|abr| *abr > 0.0) } else { None },
            byte_size: d.filesize,
            size_label: d.filesize.map(format_bytes),
        };
        option.label = Self::label(&option);
        option
    }

    /// De-duplication key: resolution for video kinds, bitrate for audio
    fn dedup_key(option: &FormatOption) -> (FormatKind, String) {
        let discriminator = match option.kind {
            FormatKind::Best => BEST_FORMAT_ID.to_string(),
            FormatKind::CombinedAV | FormatKind::VideoOnly => {
                format!("{}-{}p", option.container_ext, option.height.unwrap_or(0))
            }
            FormatKind::AudioOnly => match option.audio_bitrate_kbps {
                Some(abr) => format!("{}-{}", option.container_ext, abr),
                None => format!("{}-unknown", option.container_ext),
            },
        };
        (option.kind, discriminator)
    }

    /// Deterministic display label for an option
    pub fn label(option: &FormatOption) -> String {
        let ext = option.container_ext.to_uppercase();
        let height = option.height.unwrap_or(0);
        match option.kind {
            FormatKind::Best => BEST_LABEL.to_string(),
            FormatKind::CombinedAV => format!("{} - {}p (Vídeo + Áudio)", ext, height),
            FormatKind::VideoOnly => format!("{} - {}p (Vídeo)", ext, height),
            FormatKind::AudioOnly => match option.audio_bitrate_kbps {
                Some(abr) => format!("{} - {} kbps (Áudio)", ext, abr),
                None => format!("{} - Unknown kbps (Áudio)", ext),
            },
        }
    }
}

/// Human-readable size using base-1024 units, rounded to 2 decimals.
///
/// `format_bytes(1536)` is "1.5 KB"; zero is "0 B".
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, SIZE_UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combined(id: &str, ext: &str, height: u32) -> EncodingDescriptor {
        EncodingDescriptor {
            format_id: Some(id.to_string()),
            ext: Some(ext.to_string()),
            vcodec: Some("avc1.640028".to_string()),
            acodec: Some("mp4a.40.2".to_string()),
            height: Some(height),
            width: Some(height * 16 / 9),
            fps: Some(30.0),
            ..Default::default()
        }
    }

    fn video_only(id: &str, ext: &str, height: u32) -> EncodingDescriptor {
        EncodingDescriptor {
            acodec: Some("none".to_string()),
            ..combined(id, ext, height)
        }
    }

    fn audio_only(id: &str, ext: &str, abr: Option<f64>) -> EncodingDescriptor {
        EncodingDescriptor {
            format_id: Some(id.to_string()),
            ext: Some(ext.to_string()),
            vcodec: Some("none".to_string()),
            acodec: Some("mp4a.40.2".to_string()),
            abr,
            ..Default::default()
        }
    }

    fn labels(options: &[FormatOption]) -> Vec<&str> {
        options.iter().map(|o| o.label.as_str()).collect()
    }

    #[test]
    fn test_empty_and_missing_input_yield_only_best() {
        for options in [FormatSelector::normalize(None), FormatSelector::normalize(Some(&[]))] {
            assert_eq!(options.len(), 1);
            assert_eq!(options[0].kind, FormatKind::Best);
            assert_eq!(options[0].id, "best");
            assert_eq!(options[0].container_ext, "mp4");
        }
    }

    #[test]
    fn test_combined_and_audio_labels() {
        let raw = vec![combined("22", "mp4", 1080), audio_only("140", "m4a", Some(128.0))];
        let options = FormatSelector::normalize(Some(&raw));

        assert_eq!(
            labels(&options),
            vec![
                "Melhor Qualidade (Automático)",
                "MP4 - 1080p (Vídeo + Áudio)",
                "M4A - 128 kbps (Áudio)",
            ]
        );
        assert_eq!(options[1].id, "22");
        assert_eq!(options[2].audio_bitrate_kbps, Some(128.0));
    }

    #[test]
    fn test_groups_are_ordered_combined_video_audio() {
        let raw = vec![
            audio_only("251", "webm", Some(160.0)),
            video_only("137", "mp4", 1080),
            combined("18", "mp4", 360),
            video_only("248", "webm", 1080),
        ];
        let kinds: Vec<FormatKind> = FormatSelector::normalize(Some(&raw))
            .iter()
            .map(|o| o.kind)
            .collect();

        assert_eq!(
            kinds,
            vec![
                FormatKind::Best,
                FormatKind::CombinedAV,
                FormatKind::VideoOnly,
                FormatKind::VideoOnly,
                FormatKind::AudioOnly,
            ]
        );
    }

    #[test]
    fn test_first_seen_wins_on_duplicate_key() {
        let raw = vec![
            video_only("137", "mp4", 1080),
            video_only("399", "mp4", 1080),
            audio_only("139", "m4a", None),
            audio_only("140", "m4a", None),
        ];
        let options = FormatSelector::normalize(Some(&raw));
        let ids: Vec<&str> = options.iter().map(|o| o.id.as_str()).collect();

        assert_eq!(ids, vec!["best", "137", "139"]);
        assert_eq!(options[2].label, "M4A - Unknown kbps (Áudio)");
    }

    #[test]
    fn test_same_resolution_different_kind_is_kept() {
        let raw = vec![combined("22", "mp4", 720), video_only("136", "mp4", 720)];
        assert_eq!(FormatSelector::normalize(Some(&raw)).len(), 3);
    }

    #[test]
    fn test_no_duplicate_keys_in_output() {
        let raw = vec![
            combined("a", "mp4", 720),
            combined("b", "mp4", 720),
            combined("c", "webm", 720),
            video_only("d", "mp4", 480),
            video_only("e", "mp4", 480),
            audio_only("f", "opus", Some(50.0)),
            audio_only("g", "opus", Some(50.0)),
            audio_only("h", "opus", Some(70.0)),
        ];
        let options = FormatSelector::normalize(Some(&raw));
        let mut keys = HashSet::new();
        for option in &options {
            assert!(keys.insert(FormatSelector::dedup_key(option)), "duplicate {:?}", option);
        }
        assert_eq!(options.len(), 6);
    }

    #[test]
    fn test_descriptors_without_id_or_codecs_are_dropped() {
        let raw = vec![
            EncodingDescriptor {
                format_id: None,
                ..combined("x", "mp4", 720)
            },
            EncodingDescriptor {
                format_id: Some("sb0".to_string()),
                ext: Some("mhtml".to_string()),
                vcodec: Some("none".to_string()),
                acodec: Some("none".to_string()),
                ..Default::default()
            },
        ];
        assert_eq!(FormatSelector::normalize(Some(&raw)).len(), 1);
    }

    #[test]
    fn test_missing_ext_and_height_defaults() {
        let raw = vec![
            EncodingDescriptor {
                format_id: Some("0".to_string()),
                ..Default::default()
            },
            EncodingDescriptor {
                format_id: Some("1".to_string()),
                vcodec: Some("none".to_string()),
                ..Default::default()
            },
        ];
        let options = FormatSelector::normalize(Some(&raw));
        assert_eq!(options[1].label, "MP4 - 0p (Vídeo + Áudio)");
        assert_eq!(options[2].label, "M4A - Unknown kbps (Áudio)");
    }

    #[test]
    fn test_missing_ext_dedups_as_default_container() {
        // No ext means mp4 for video, so it shares a key with the explicit
        // 720p mp4 and only the first of the two survives
        let raw = vec![
            EncodingDescriptor {
                format_id: Some("no-ext".to_string()),
                height: Some(720),
                ..Default::default()
            },
            combined("22", "mp4", 720),
            combined("45", "webm", 720),
        ];
        let options = FormatSelector::normalize(Some(&raw));
        let ids: Vec<&str> = options.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec![BEST_FORMAT_ID, "no-ext", "45"]);
        assert_eq!(options[1].label, "MP4 - 720p (Vídeo + Áudio)");
    }

    #[test]
    fn test_normalize_is_repeatable() {
        let raw = vec![
            combined("22", "mp4", 720),
            audio_only("140", "m4a", Some(129.478)),
        ];
        let first = FormatSelector::normalize(Some(&raw));
        let second = FormatSelector::normalize(Some(&raw));
        assert_eq!(first, second);
        assert_eq!(first[2].label, "M4A - 129.478 kbps (Áudio)");
    }

    #[test]
    fn test_size_label_is_attached() {
        let raw = vec![EncodingDescriptor {
            filesize: Some(1_572_864),
            ..combined("22", "mp4", 720)
        }];
        let options = FormatSelector::normalize(Some(&raw));
        assert_eq!(options[1].byte_size, Some(1_572_864));
        assert_eq!(options[1].size_label.as_deref(), Some("1.5 MB"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1_048_576), "1 MB");
        assert_eq!(format_bytes(123_456_789), "117.74 MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5 GB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 * 1024), "3072 GB");
    }
}
