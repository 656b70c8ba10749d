use chrono::{Local, NaiveDate};

const SYSTEM_PROMPT: &str = r#"You are utilizing a Chrome browser environment. You can only use the Chrome browser to perform actions.
You can use the computer tool to interact with the page.
You should use browser_navigate tool to navigate the browser.
If you see nothing, try going to bing.com.
If you scroll and nothing changes, it means you have already reached the bottom or top of this window, do not continue scrolling.
The current date is {date}.
To reduce cost, previous screenshot images have been removed from the conversation. Only the recent screenshot is included."#;

/// System prompt for a task started today.
pub fn system_prompt() -> String {
    system_prompt_for(Local::now().date_naive())
}

pub fn system_prompt_for(date: NaiveDate) -> String {
    SYSTEM_PROMPT.replace("{date}", &date.format("%A, %B %-d, %Y").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_long_form_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let prompt = system_prompt_for(date);
        assert!(prompt.contains("The current date is Friday, March 7, 2025."));
        assert!(prompt.starts_with("You are utilizing a Chrome browser environment."));
    }
}
