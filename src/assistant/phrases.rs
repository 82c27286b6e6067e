//! Spoken feedback sentences

pub const NOT_HEARD: &str = "Xin lỗi, tôi không nghe rõ. Bạn vui lòng thử lại.";
pub const REPLY_NOT_HEARD: &str = "Tôi chưa nghe thấy câu trả lời của bạn.";
pub const STOP_WAITING: &str = "Tôi sẽ chờ bạn gọi lại sau.";
pub const UNREACHABLE: &str = "Không thể kết nối tới máy chủ, vui lòng thử lại sau.";
pub const SERVICE_ERROR: &str = "Đã có lỗi xảy ra, vui lòng thử lại.";
pub const INVALID_SELECTION: &str = "Lựa chọn không hợp lệ, bạn vui lòng nói lại số thứ tự.";
pub const NO_RESULTS: &str = "Tôi không tìm thấy kết quả nào.";
pub const CALL_ACCEPTED: &str = "Đã nghe máy.";
pub const DEFAULT_CONFIRM: &str = "Bạn có muốn thực hiện không?";

#[must_use]
pub fn missing(what: &str) -> String {
    format!("Thiếu {what}, bạn vui lòng thử lại.")
}

#[must_use]
pub fn message_sent(name: &str) -> String {
    format!("Đã gửi tin nhắn cho {name}.")
}

#[must_use]
pub fn message_failed(name: &str) -> String {
    format!("Không gửi được tin nhắn cho {name}.")
}

#[must_use]
pub fn sticker_sent(name: &str) -> String {
    format!("Đã gửi sticker cho {name}.")
}

#[must_use]
pub fn emoji_sent(name: &str) -> String {
    format!("Đã gửi biểu tượng cảm xúc cho {name}.")
}

#[must_use]
pub fn group_created(name: &str) -> String {
    format!("Đã tạo nhóm {name}.")
}

#[must_use]
pub fn join_requested(name: &str) -> String {
    format!("Đã gửi yêu cầu tham gia nhóm {name}.")
}

#[must_use]
pub fn members_added(count: usize, group: &str) -> String {
    format!("Đã thêm {count} thành viên vào nhóm {group}.")
}

#[must_use]
pub fn calling(name: &str, video: bool) -> String {
    if video {
        format!("Đang gọi video cho {name}.")
    } else {
        format!("Đang gọi cho {name}.")
    }
}

#[must_use]
pub fn call_declined(name: &str) -> String {
    format!("Đã từ chối cuộc gọi từ {name}.")
}

#[must_use]
pub fn incoming_call_prompt(caller: &str, video: bool) -> String {
    let kind = if video { "gọi video" } else { "gọi" };
    format!("{caller} đang {kind} cho bạn. Bạn có muốn nghe máy không?")
}

#[must_use]
pub fn attachment_sent(file: &str, name: &str) -> String {
    format!("Đã gửi tệp {file} cho {name}.")
}

#[must_use]
pub fn search_found(count: usize, query: &str) -> String {
    format!("Tìm thấy {count} kết quả cho {query}.")
}

#[must_use]
pub fn choose_attachment_prompt(names: &[String]) -> String {
    let listed = names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("số {}: {name}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Tôi tìm thấy {} tệp: {listed}. Bạn muốn gửi tệp số mấy?", names.len())
}

#[must_use]
pub fn action_failed(what: &str) -> String {
    format!("Không thể {what}, vui lòng thử lại.")
}

#[must_use]
pub fn cancelled(kind: Option<&str>) -> String {
    match kind.map(action_label) {
        Some(label) => format!("Đã hủy {label}."),
        None => "Đã hủy.".to_string(),
    }
}

/// Human label for an action type
#[must_use]
pub fn action_label(kind: &str) -> &'static str {
    match kind {
        "send_message" => "gửi tin nhắn",
        "send_sticker" => "gửi sticker",
        "send_emoji" => "gửi biểu tượng cảm xúc",
        "create_group" => "tạo nhóm",
        "join_group" => "tham gia nhóm",
        "invite_to_group" => "thêm thành viên",
        "make_call" => "cuộc gọi",
        "incoming_call" => "cuộc gọi đến",
        "search_smart" => "tìm kiếm",
        "choose_attachment" => "gửi tệp",
        _ => "thao tác",
    }
}
