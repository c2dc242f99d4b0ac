// Built-in Vietnamese translations for short, very common bubble texts
//
// Seeded into the translation cache at startup and after a clear, so greetings,
// interjections and sound effects never cost a provider call.

use crate::core::types::{Formality, TranslationContext};
use crate::services::translation::cache::{CacheKey, TranslationCache};

/// Target language the tables are written in
pub const SEED_TARGET_LANGUAGE: &str = "vi";

const JAPANESE: &[(&str, &str)] = &[
    ("はい", "Được"),
    ("いいえ", "Không"),
    ("すみません", "Xin lỗi"),
    ("ありがとう", "Cảm ơn"),
    ("ありがとうございます", "Cảm ơn"),
    ("こんにちは", "Xin chào"),
    ("おはよう", "Chào buổi sáng"),
    ("おやすみ", "Chúc ngủ ngon"),
    ("そうですね", "Đúng vậy"),
    ("わかりました", "Tôi hiểu rồi"),
    ("がんばって", "Cố lên!"),
    ("やった", "Làm được rồi!"),
    ("だめ", "Không được"),
    ("すごい", "Tuyệt vời!"),
    ("やばい", "Tệ rồi!"),
    ("本当", "Thật sự"),
    ("嘘", "Dối trá"),
    ("待って", "Đợi đã"),
    ("助けて", "Giúp tôi"),
    ("そうか", "Ra vậy"),
    ("なるほど", "Hiểu rồi"),
    ("大丈夫", "Không sao đâu"),
    ("お疲れ様", "Cảm ơn bạn đã vất vả"),
    ("頑張れ", "Cố lên nào!"),
    ("無理", "Không thể được"),
    ("危ない", "Nguy hiểm!"),
    ("見つけた", "Tìm thấy rồi!"),
    ("行こう", "Đi thôi!"),
    ("やめて", "Dừng lại!"),
    // Sound effects
    ("バン", "BÙNG!"),
    ("ドン", "RẦM!"),
    ("キラキラ", "lấp lánh"),
    ("ドキドキ", "thình thịch"),
    ("ブーン", "VỪN!"),
    ("ザー", "ào ào"),
    ("ピカピカ", "lóng lánh"),
    ("ガタガタ", "run bần bật"),
    ("ペコペコ", "đói cồn cào"),
    ("フワフワ", "mềm mịn"),
    ("ズズズ", "húp húp"),
    ("パチパチ", "tép tép"),
    // Laughter, reactions, hesitation
    ("ハハハ", "Ha ha ha!"),
    ("ホホホ", "Ho ho ho!"),
    ("えへへ", "He he he"),
    ("うううう", "Ưưưư"),
    ("やれやれ", "Hài thật"),
    ("まずい", "Tệ rồi"),
    ("しまった", "Chết tiệt!"),
    ("よし", "Được rồi!"),
    ("うーん", "Ừm..."),
    ("そうねえ", "Để xem nào..."),
];

const CHINESE: &[(&str, &str)] = &[
    ("你好", "Xin chào"),
    ("谢谢", "Cảm ơn"),
    ("对不起", "Xin lỗi"),
    ("不客气", "Không có gì"),
    ("再见", "Tạm biệt"),
    ("是的", "Đúng vậy"),
    ("不是", "Không phải"),
    ("好的", "Được rồi"),
    ("没问题", "Không vấn đề gì"),
    ("太好了", "Quá tuyệt!"),
    ("加油", "Cố lên!"),
    ("小心", "Cẩn thận"),
    ("等等", "Đợi chút"),
    ("救命", "Cứu tôi"),
    ("走吧", "Đi thôi!"),
    ("没事", "Không sao"),
    ("真的吗", "Thật sự à?"),
    ("当然", "Dĩ nhiên"),
    ("不要", "Đừng"),
    ("快点", "Nhanh lên!"),
    ("慢着", "Khoan đã"),
    ("完了", "Xong rồi"),
    ("怎么了", "Sao vậy?"),
    ("明白了", "Hiểu rồi"),
    // Sound effects
    ("轰", "BOOM!"),
    ("砰", "ĐỤC!"),
    ("咔嚓", "KẮC!"),
    ("嘶", "xì"),
    ("呼", "phù"),
    ("啪", "tách"),
    ("哗", "ào"),
    ("嘭", "bụp"),
    ("咕咚", "cục tác"),
    ("滴答", "tích tắc"),
    ("哐当", "loảng xoảng"),
    ("哈哈哈", "Ha ha ha!"),
    ("呵呵", "He he"),
    ("糟糕", "Tệ rồi"),
    ("完蛋", "Tiêu rồi"),
    ("嗯", "Ừm"),
    ("这样啊", "Ra vậy à"),
];

const KOREAN: &[(&str, &str)] = &[
    ("안녕하세요", "Xin chào"),
    ("감사합니다", "Cảm ơn"),
    ("죄송합니다", "Xin lỗi"),
    ("네", "Vâng"),
    ("아니요", "Không"),
    ("괜찮아요", "Không sao đâu"),
    ("잠깐만요", "Chờ chút"),
    ("도와주세요", "Giúp tôi"),
    ("화이팅", "Cố lên!"),
    ("대박", "Tuyệt vời!"),
    ("헐", "Hả?!"),
    ("와", "Wow!"),
    ("가자", "Đi thôi!"),
    ("알겠어", "Hiểu rồi"),
    ("진짜", "Thật sự"),
    ("맞아", "Đúng rồi"),
    ("아니야", "Không phải"),
    ("빨리", "Nhanh lên"),
    ("잠깐", "Khoan"),
    ("끝났어", "Xong rồi"),
    ("뭐야", "Cái gì vậy?"),
    ("어떻게", "Làm sao?"),
    // Sound effects
    ("쾅", "CẠCH!"),
    ("쿵", "RẦM!"),
    ("휘익", "VỪN!"),
    ("따르르", "lách tách"),
    ("두근두근", "thình thịch"),
    ("펑", "bùng"),
    ("찰칵", "cắt"),
    ("쨍", "lanh"),
    ("부웅", "vù"),
    ("졸졸", "róc rách"),
    ("호호호", "Ho ho ho"),
    ("하하하", "Ha ha ha"),
    ("아차", "Ối"),
    ("어이구", "Ôi trời"),
    ("음", "Ừm"),
    ("그렇구나", "Ra vậy"),
];

/// Tone a phrase only takes under
#[derive(Debug, Clone, Copy)]
enum Tone {
    Formal,
    Casual,
    Emotion(&'static str),
}

impl Tone {
    fn context(self) -> TranslationContext {
        match self {
            Tone::Formal => TranslationContext {
                formality: Formality::Polite,
                ..Default::default()
            },
            Tone::Casual => TranslationContext {
                formality: Formality::Casual,
                ..Default::default()
            },
            Tone::Emotion(emotion) => TranslationContext {
                emotion: emotion.to_string(),
                ..Default::default()
            },
        }
    }
}

const CONTEXTUAL: &[(&str, &str, Tone, &str)] = &[
    ("ja", "です", Tone::Formal, "ạ"),
    ("ja", "ます", Tone::Formal, "ạ"),
    ("ko", "습니다", Tone::Formal, "ạ"),
    ("zh", "您好", Tone::Formal, "Thưa"),
    ("ja", "だよ", Tone::Casual, "đấy"),
    ("ja", "じゃん", Tone::Casual, "mà"),
    ("zh", "哦", Tone::Casual, "ồ"),
    ("ja", "うれしい", Tone::Emotion("happy"), "vui quá"),
    ("ja", "悲しい", Tone::Emotion("sad"), "buồn thật"),
    ("ko", "기쁘다", Tone::Emotion("happy"), "vui quá"),
    ("ko", "슬프다", Tone::Emotion("sad"), "buồn thật"),
];

/// Cache entries for every built-in phrase, keyed under both `auto` and the
/// phrase's own language. Empty unless `target_lang` is Vietnamese.
pub fn seed_entries(target_lang: &str) -> Vec<(CacheKey, String)> {
    if !target_lang.trim().eq_ignore_ascii_case(SEED_TARGET_LANGUAGE) {
        return Vec::new();
    }

    let mut entries = Vec::new();
    for (lang, table) in [("ja", JAPANESE), ("zh", CHINESE), ("ko", KOREAN)] {
        for (text, translated) in table {
            for source in ["auto", lang] {
                entries.push((
                    TranslationCache::fingerprint(text, source, None),
                    translated.to_string(),
                ));
            }
        }
    }
    for (lang, text, tone, translated) in CONTEXTUAL {
        let ctx = tone.context();
        for source in ["auto", lang] {
            entries.push((
                TranslationCache::fingerprint(text, source, Some(&ctx)),
                translated.to_string(),
            ));
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_only_for_vietnamese() {
        assert!(seed_entries("en").is_empty());
        assert!(!seed_entries("VI").is_empty());
    }

    #[test]
    fn test_keys_are_unique() {
        let entries = seed_entries("vi");
        let keys: HashSet<_> = entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys.len(), entries.len());
        assert_eq!(entries.len(), 2 * (JAPANESE.len() + CHINESE.len() + KOREAN.len() + CONTEXTUAL.len()));
    }

    #[test]
    fn test_contextual_phrase_needs_its_tone() {
        let entries = seed_entries("vi");
        let polite = TranslationContext {
            formality: Formality::Polite,
            ..Default::default()
        };
        let formal = TranslationCache::fingerprint("です", "ja", Some(&polite));
        let plain = TranslationCache::fingerprint("です", "ja", None);
        assert!(entries.iter().any(|(k, v)| *k == formal && v == "ạ"));
        assert!(!entries.iter().any(|(k, _)| *k == plain));
    }
}
