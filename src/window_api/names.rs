use std::path::Path;

pub const UNKNOWN_APP: &str = "Unknown";

/// Well known executables and the names they are usually referred by.
const KNOWN_APPS: &[(&str, &str)] = &[
    ("code", "Visual Studio Code"),
    ("cursor", "Cursor"),
    ("chrome", "Google Chrome"),
    ("google-chrome", "Google Chrome"),
    ("msedge", "Microsoft Edge"),
    ("firefox", "Firefox"),
    ("wechat", "WeChat"),
    ("weixin", "WeChat"),
    ("qq", "QQ"),
    ("dingtalk", "DingTalk"),
    ("feishu", "Feishu"),
    ("lark", "Feishu"),
    ("slack", "Slack"),
    ("discord", "Discord"),
    ("telegram", "Telegram"),
    ("notion", "Notion"),
    ("obsidian", "Obsidian"),
    ("typora", "Typora"),
    ("word", "Microsoft Word"),
    ("winword", "Microsoft Word"),
    ("excel", "Microsoft Excel"),
    ("powerpnt", "Microsoft PowerPoint"),
    ("outlook", "Microsoft Outlook"),
    ("notepad", "Notepad"),
    ("notepad++", "Notepad++"),
    ("sublime_text", "Sublime Text"),
    ("idea64", "IntelliJ IDEA"),
    ("pycharm64", "PyCharm"),
    ("webstorm64", "WebStorm"),
    ("datagrip64", "DataGrip"),
    ("explorer", "File Explorer"),
    ("windowsterminal", "Windows Terminal"),
    ("cmd", "Command Prompt"),
    ("powershell", "PowerShell"),
    ("spotify", "Spotify"),
    ("cloudmusic", "NetEase Cloud Music"),
    ("qqmusic", "QQ Music"),
    ("potplayer", "PotPlayer"),
    ("potplayer64", "PotPlayer"),
    ("vlc", "VLC"),
    ("steam", "Steam"),
    ("epicgameslauncher", "Epic Games"),
];

/// Strips the directory and a trailing `.exe` from a process path.
pub fn clean_process_name(value: &str) -> String {
    let file_name = value.rsplit(['/', '\\']).next().unwrap_or(value);
    let file_name = Path::new(file_name)
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    match file_name.len().checked_sub(4) {
        Some(split) if file_name.is_char_boundary(split)
            && file_name[split..].eq_ignore_ascii_case(".exe") =>
        {
            file_name[..split].to_string()
        }
        _ => file_name,
    }
}

/// Name of an application as shown on the timeline.
pub fn friendly_app_name(process_name: &str) -> String {
    let clean = clean_process_name(process_name.trim());
    if clean.is_empty() {
        return UNKNOWN_APP.to_string();
    }
    let lower = clean.to_lowercase();
    if let Some((_, name)) = KNOWN_APPS.iter().find(|(key, _)| *key == lower) {
        return name.to_string();
    }
    title_case(&clean)
}

fn title_case(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut capitalize = true;
    for c in value.chars() {
        if c.is_alphabetic() {
            if capitalize {
                result.extend(c.to_uppercase());
            } else {
                result.extend(c.to_lowercase());
            }
            capitalize = false;
        } else {
            result.push(c);
            capitalize = true;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_applications_are_mapped() {
        assert_eq!(
            friendly_app_name(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            "Google Chrome"
        );
        assert_eq!(friendly_app_name("/usr/share/code/code"), "Visual Studio Code");
        assert_eq!(friendly_app_name("WINWORD.EXE"), "Microsoft Word");
    }

    #[test]
    fn unknown_applications_are_title_cased() {
        assert_eq!(friendly_app_name("/usr/bin/alacritty"), "Alacritty");
        assert_eq!(friendly_app_name("my-tool.exe"), "My-Tool");
    }

    #[test]
    fn empty_process_is_unknown() {
        assert_eq!(friendly_app_name(""), UNKNOWN_APP);
        assert_eq!(friendly_app_name("   "), UNKNOWN_APP);
    }

    #[test]
    fn clean_process_name_strips_path_and_extension() {
        assert_eq!(clean_process_name(r"C:\Tools\nvim.exe"), "nvim");
        assert_eq!(clean_process_name("/home/user/.cargo/bin/nvim"), "nvim");
        assert_eq!(clean_process_name("a.exe.bak"), "a.exe.bak");
    }
}
