//! Test fixtures for integration tests
//!
//! Sample repository lists in both supported formats

#![allow(dead_code)]

/// TVBox text list with two categories
pub const SAMPLE_TXT: &str = "\
央视频道,#genre#
CCTV-1,http://cctv.example/1.m3u8
CCTV-2,http://cctv.example/2.m3u8#http://backup.example/2.m3u8
CCTV-5,http://cctv.example/5.m3u8

卫视频道,#genre#
湖南卫视,http://ws.example/hunan.m3u8
浙江卫视,http://ws.example/zhejiang.m3u8$高清
";

/// M3U list overlapping with [`SAMPLE_TXT`]
pub const SAMPLE_M3U: &str = r#"#EXTM3U x-tvg-url="http://epg.example/e.xml"
#EXTINF:-1 tvg-name="CCTV-1" tvg-country="" group-title="央视频道",CCTV-1 综合
http://mirror.example/cctv1.m3u8
#EXTINF:-1 tvg-name="CCTV-2" group-title="央视频道",CCTV-2 财经
http://cctv.example/2.m3u8
#EXTINF:-1 group-title="卫视频道" tvg-language="Chinese",东方卫视
http://ws.example/dongfang.m3u8
"#;

/// Lines that the parser must drop
pub const MALFORMED_TXT: &str = "\
新闻,#genre#
,http://nameless.example/1
CCTV-13,ftp://files.example/13
CCTV-13,http://news.example/13
just some text
http://orphan.example/x
";

/// Every URL in [`SAMPLE_TXT`] and [`SAMPLE_M3U`] that a fake prober should
/// treat as live for the "healthy" scenario
pub fn healthy_urls() -> Vec<&'static str> {
    vec![
        "http://cctv.example/1.m3u8",
        "http://cctv.example/2.m3u8",
        "http://cctv.example/5.m3u8",
        "http://ws.example/hunan.m3u8",
        "http://ws.example/zhejiang.m3u8",
        "http://ws.example/dongfang.m3u8",
    ]
}
