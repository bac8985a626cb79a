//! Fixed TTS voice catalog and role-based recommendation.

use schemars::JsonSchema;
use serde::Serialize;

/// Reserved narrator voice. Used for non-dialogue text and as the
/// ultimate fallback; never assigned to a character during
/// sanitization unless the catalog is exhausted.
pub const NARRATOR_VOICE_ID: &str = "zh-CN-YunxiNeural";

/// One entry of the fixed voice catalog.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct VoiceInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub gender: &'static str,
    pub age: &'static str,
    pub description: &'static str,
}

/// The fixed voice catalog. Order matters: free-voice fallback picks
/// the first unused entry.
pub const VOICES: &[VoiceInfo] = &[
    VoiceInfo {
        id: "zh-CN-YunxiNeural",
        name: "雲希",
        gender: "male",
        age: "young",
        description: "清晰穩重",
    },
    VoiceInfo {
        id: "zh-CN-YunyangNeural",
        name: "雲揚",
        gender: "male",
        age: "young",
        description: "活潑陽光",
    },
    VoiceInfo {
        id: "zh-CN-YunjianNeural",
        name: "雲健",
        gender: "male",
        age: "middle",
        description: "成熟威嚴",
    },
    VoiceInfo {
        id: "zh-CN-YunzeNeural",
        name: "雲澤",
        gender: "male",
        age: "young",
        description: "溫和親切",
    },
    VoiceInfo {
        id: "zh-CN-XiaoxiaoNeural",
        name: "曉曉",
        gender: "female",
        age: "young",
        description: "溫柔甜美",
    },
    VoiceInfo {
        id: "zh-CN-XiaoyiNeural",
        name: "曉伊",
        gender: "female",
        age: "young",
        description: "活潑可愛",
    },
    VoiceInfo {
        id: "zh-CN-XiaohanNeural",
        name: "曉涵",
        gender: "female",
        age: "middle",
        description: "優雅知性",
    },
    VoiceInfo {
        id: "zh-CN-XiaomengNeural",
        name: "曉夢",
        gender: "female",
        age: "young",
        description: "清純夢幻",
    },
    VoiceInfo {
        id: "zh-CN-XiaomoNeural",
        name: "曉墨",
        gender: "female",
        age: "young",
        description: "冷靜專業",
    },
    VoiceInfo {
        id: "zh-CN-XiaoruiNeural",
        name: "曉睿",
        gender: "female",
        age: "young",
        description: "聰慧機智",
    },
];

/// Whether a voice id is present in the catalog.
pub fn is_catalog_voice(voice_id: &str) -> bool {
    VOICES.iter().any(|voice| voice.id == voice_id)
}

/// Recommend a catalog voice from role and personality text.
pub fn recommend_voice(role: &str, personality: &str) -> &'static str {
    let content = format!("{role} {personality}");
    let contains_any = |words: &[&str]| words.iter().any(|word| content.contains(word));

    if contains_any(&["女", "少女", "公主", "女主"]) {
        if contains_any(&["活潑", "可愛", "俏皮"]) {
            return "zh-CN-XiaoyiNeural";
        }
        if contains_any(&["冷", "理性", "專業"]) {
            return "zh-CN-XiaomoNeural";
        }
        return "zh-CN-XiaoxiaoNeural";
    }
    if contains_any(&["長者", "師父", "權威", "反派"]) {
        return "zh-CN-YunjianNeural";
    }
    if contains_any(&["少年", "熱血", "活力"]) {
        return "zh-CN-YunyangNeural";
    }
    NARRATOR_VOICE_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrator_is_in_catalog() {
        assert!(is_catalog_voice(NARRATOR_VOICE_ID));
    }

    #[test]
    fn test_recommend_voice_by_role() {
        assert_eq!(recommend_voice("女主", "活潑"), "zh-CN-XiaoyiNeural");
        assert_eq!(recommend_voice("公主", "冷靜理性"), "zh-CN-XiaomoNeural");
        assert_eq!(recommend_voice("師父", ""), "zh-CN-YunjianNeural");
        assert_eq!(recommend_voice("少年", "熱血"), "zh-CN-YunyangNeural");
        assert_eq!(recommend_voice("旁白", ""), NARRATOR_VOICE_ID);
    }
}
