//! Turns API payloads into reply segments

use super::models::{ArticleCard, DynamicDetail, LiveCard, VideoCard};
use crate::reply::{Reply, Segment};
use crate::utils::human_num;
use std::fmt::Write as _;

/// Canonical page of a video
#[must_use]
pub fn video_url(card: &VideoCard) -> String {
    if card.bvid.is_empty() {
        format!("https://www.bilibili.com/video/av{}", card.aid)
    } else {
        format!("https://www.bilibili.com/video/{}", card.bvid)
    }
}

/// Video info card: cover, title, uploader(s), counters, link
#[must_use]
pub fn video_reply(card: &VideoCard) -> Reply {
    let mut reply = Reply::new();
    if !card.pic.is_empty() {
        reply.push(Segment::Image(card.pic.clone()));
    }

    let mut text = format!("标题: {}\n", card.title);
    if card.staff.is_empty() {
        let _ = writeln!(text, "UP主: {}", card.owner.name);
    } else {
        let names: Vec<String> = card
            .staff
            .iter()
            .map(|s| format!("{}({})", s.name, s.title))
            .collect();
        let _ = writeln!(text, "合作UP主: {}", names.join(", "));
    }
    let stat = &card.stat;
    let _ = writeln!(
        text,
        "播放: {} 弹幕: {} 点赞: {} 投币: {} 收藏: {} 分享: {}",
        human_num(stat.view),
        human_num(stat.danmaku),
        human_num(stat.like),
        human_num(stat.coin),
        human_num(stat.favorite),
        human_num(stat.share),
    );
    let _ = writeln!(text, "网址: {}", video_url(card));
    reply.push_text(text);
    reply
}

/// Article card for article `id`
#[must_use]
pub fn article_reply(card: &ArticleCard, id: &str) -> Reply {
    let mut reply = Reply::new();
    if let Some(cover) = card.origin_image_urls.first() {
        reply.push(Segment::Image(cover.clone()));
    }
    let mut text = format!("{}\n", card.title);
    let _ = writeln!(text, "UP主: {}", card.author_name);
    let _ = writeln!(
        text,
        "阅读: {} 评论: {}",
        human_num(card.stats.view),
        human_num(card.stats.reply)
    );
    let _ = writeln!(text, "网址: https://www.bilibili.com/read/cv{id}");
    reply.push_text(text);
    reply
}

/// Live room card
#[must_use]
pub fn live_reply(card: &LiveCard) -> Reply {
    let room = &card.room_info;
    let mut reply = Reply::new();
    if !room.cover.is_empty() {
        reply.push(Segment::Image(room.cover.clone()));
    }
    let status = match room.live_status {
        1 => "直播中",
        2 => "轮播中",
        _ => "未开播",
    };
    let mut text = format!("[{status}] {}\n", room.title);
    let _ = writeln!(text, "主播: {}", card.anchor_info.base_info.uname);
    if room.parent_area_name.is_empty() {
        let _ = writeln!(text, "分区: {}", room.area_name);
    } else {
        let _ = writeln!(text, "分区: {}-{}", room.parent_area_name, room.area_name);
    }
    if room.live_status == 1 {
        let _ = writeln!(text, "人气: {}", human_num(room.online));
    }
    let _ = writeln!(text, "网址: https://live.bilibili.com/{}", room.room_id);
    reply.push_text(text);
    reply
}

/// Feed post card with its text, images and attachment
#[must_use]
pub fn dynamic_reply(detail: &DynamicDetail, id: &str) -> Reply {
    let modules = &detail.item.modules;
    let author = &modules.module_author;
    let body = &modules.module_dynamic;

    let mut text = format!("{} 发布于 {}\n", author.name, author.pub_time);
    let mut images: Vec<String> = Vec::new();

    if let Some(desc) = body.desc.as_ref().filter(|d| !d.text.is_empty()) {
        let _ = writeln!(text, "{}", desc.text);
    }
    if let Some(major) = &body.major {
        if let Some(opus) = &major.opus {
            if let Some(title) = opus.title.as_ref().filter(|t| !t.is_empty()) {
                let _ = writeln!(text, "{title}");
            }
            if let Some(summary) = &opus.summary {
                let _ = writeln!(text, "{}", summary.text);
            }
            images.extend(opus.pics.iter().map(|p| p.url.clone()));
        }
        if let Some(draw) = &major.draw {
            images.extend(draw.items.iter().map(|i| i.src.clone()));
        }
        if let Some(archive) = &major.archive {
            let _ = writeln!(text, "视频: {}", archive.title);
            let _ = writeln!(text, "https://www.bilibili.com/video/{}", archive.bvid);
            images.push(archive.cover.clone());
        }
        if let Some(article) = &major.article {
            let _ = writeln!(text, "专栏: {}", article.title);
            images.extend(article.covers.iter().cloned());
        }
    }
    let _ = writeln!(text, "网址: https://t.bilibili.com/{id}");

    let mut reply = Reply::text(text);
    for url in images.into_iter().filter(|u| !u.is_empty()) {
        reply.push(Segment::Image(url));
    }
    reply
}
