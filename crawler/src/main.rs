use anyhow::Result;
use clap::Parser;
use parking_lot::RwLock;
use pubscout_core::{stable_id, DocumentRecord};
use reqwest::{header, Client};
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tokio::time::sleep;
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "pubscout-crawler")]
#[command(about = "Crawl a research portal's publications to JSONL, respecting robots.txt")]
struct Cli {
    /// Portal base URL, e.g. https://pureportal.example.ac.uk
    #[arg(long)]
    base: String,
    /// Persons listing path of the organisation to crawl
    #[arg(
        long,
        default_value = "/en/organisations/school-of-economics-finance-and-accounting/persons/"
    )]
    persons_path: String,
    /// Output JSONL file path
    #[arg(long, default_value = "./data/records.jsonl")]
    output: String,
    /// Cap on listing pages fetched per paginated list
    #[arg(long, default_value_t = 50)]
    max_pages: usize,
    /// Cap on persons crawled (0 = all)
    #[arg(long, default_value_t = 0)]
    max_persons: usize,
    /// Politeness delay between fetches, milliseconds
    #[arg(long, default_value_t = 1500)]
    delay_ms: u64,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    /// User-Agent string to use for robots.txt and crawling
    #[arg(long, default_value = "pubscout-bot/0.1 (+https://example.com/bot)")]
    user_agent: String,
}

#[derive(Debug, Clone)]
struct Person {
    name: String,
    url: Url,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();
    if let Some(dir) = Path::new(&args.output).parent() {
        fs::create_dir_all(dir)?;
    }

    let client = Client::builder()
        .user_agent(args.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;
    let robots: RobotsCache = Arc::new(RwLock::new(HashMap::new()));
    let base = Url::parse(&args.base)?;

    let persons = crawl_persons(&client, &robots, &base, &args).await?;
    tracing::info!(persons = persons.len(), "persons discovered");

    let mut out = BufWriter::new(File::create(&args.output)?);
    let mut seen: HashSet<String> = HashSet::new();
    let mut emitted = 0usize;
    let cap = if args.max_persons == 0 {
        persons.len()
    } else {
        args.max_persons
    };
    for (i, person) in persons.iter().take(cap).enumerate() {
        tracing::info!(n = i + 1, of = cap, name = %person.name, "crawling person");
        match crawl_person_publications(&client, &robots, &base, person, &args).await {
            Ok(records) => {
                for record in records {
                    if seen.insert(record.id.clone()) {
                        serde_json::to_writer(&mut out, &record)?;
                        out.write_all(b"\n")?;
                        emitted += 1;
                    }
                }
            }
            Err(err) => tracing::warn!(name = %person.name, %err, "skipping person"),
        }
        sleep(Duration::from_millis(args.delay_ms)).await;
    }
    out.flush()?;
    tracing::info!(emitted, output = %args.output, "crawl complete");
    Ok(())
}

/// Walk the organisation's paginated persons listing until a page yields
/// nothing new or the page cap is reached.
async fn crawl_persons(
    client: &Client,
    robots: &RobotsCache,
    base: &Url,
    args: &Cli,
) -> Result<Vec<Person>> {
    let listing = base.join(&args.persons_path)?;
    let mut persons: Vec<Person> = Vec::new();
    let mut known: HashSet<String> = HashSet::new();

    for page in 0..args.max_pages {
        let url = page_url(&listing, page);
        let Some(html) = fetch_html(client, robots, &url, &args.user_agent).await? else {
            break;
        };
        let found = parse_persons(&html, base);
        let before = persons.len();
        for person in found {
            if known.insert(person.url.to_string()) {
                persons.push(person);
            }
        }
        if persons.len() == before {
            break;
        }
        sleep(Duration::from_millis(args.delay_ms)).await;
    }
    Ok(persons)
}

/// Fetch one person's paginated publications listing and parse each result
/// container into a record.
async fn crawl_person_publications(
    client: &Client,
    robots: &RobotsCache,
    base: &Url,
    person: &Person,
    args: &Cli,
) -> Result<Vec<DocumentRecord>> {
    let listing = person.url.join("publications/")?;
    let mut records: Vec<DocumentRecord> = Vec::new();
    let mut known: HashSet<String> = HashSet::new();

    for page in 0..args.max_pages {
        let url = page_url(&listing, page);
        let Some(html) = fetch_html(client, robots, &url, &args.user_agent).await? else {
            break;
        };
        let crawled_at = now_rfc3339();
        let found = parse_publications(&html, base, person, &crawled_at);
        let before = records.len();
        for record in found {
            if known.insert(record.id.clone()) {
                records.push(record);
            }
        }
        if records.len() == before {
            break;
        }
        sleep(Duration::from_millis(args.delay_ms)).await;
    }
    Ok(records)
}

fn page_url(listing: &Url, page: usize) -> Url {
    let mut url = listing.clone();
    if page > 0 {
        url.query_pairs_mut().append_pair("page", &page.to_string());
    }
    url
}

/// GET one HTML page if robots.txt allows it; `None` means disallowed,
/// non-HTML, or a non-success status.
async fn fetch_html(
    client: &Client,
    robots: &RobotsCache,
    url: &Url,
    user_agent: &str,
) -> Result<Option<String>> {
    if !allowed(client, robots, url, user_agent).await.unwrap_or(false) {
        tracing::debug!(%url, "disallowed by robots.txt");
        return Ok(None);
    }
    if let Some(delay) = robots_delay(robots, url) {
        sleep(Duration::from_millis(delay)).await;
    }

    let resp = match client.get(url.clone()).send().await {
        Ok(resp) => resp,
        Err(err) => {
            tracing::warn!(%url, %err, "fetch failed");
            return Ok(None);
        }
    };
    if !resp.status().is_success() {
        return Ok(None);
    }
    if let Some(ct) = resp.headers().get(header::CONTENT_TYPE) {
        if let Ok(v) = ct.to_str() {
            if !v.starts_with("text/html") {
                return Ok(None);
            }
        }
    }
    Ok(resp.text().await.ok())
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

// --- page parsing -------------------------------------------------------

fn parse_persons(html: &str, base: &Url) -> Vec<Person> {
    let doc = Html::parse_document(html);
    let sel_card = Selector::parse("div.result-container h3.title a").unwrap();

    let mut persons = Vec::new();
    for a in doc.select(&sel_card) {
        let name = a.text().collect::<String>().trim().to_string();
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href) else { continue };
        if !name.is_empty() {
            persons.push(Person { name, url });
        }
    }
    persons
}

fn parse_publications(
    html: &str,
    base: &Url,
    person: &Person,
    crawled_at: &str,
) -> Vec<DocumentRecord> {
    let doc = Html::parse_document(html);
    let sel_container = Selector::parse("div.result-container").unwrap();
    let sel_title = Selector::parse("h3.title a").unwrap();
    let sel_date = Selector::parse("span.date").unwrap();
    let sel_type = Selector::parse("span.type").unwrap();
    let sel_person = Selector::parse("a.person").unwrap();

    let mut records = Vec::new();
    for container in doc.select(&sel_container) {
        let Some(link) = container.select(&sel_title).next() else {
            continue;
        };
        let title = link.text().collect::<String>().trim().to_string();
        let url = link
            .value()
            .attr("href")
            .and_then(|href| base.join(href).ok())
            .map(|u| u.to_string())
            .unwrap_or_default();
        if title.is_empty() || url.is_empty() {
            continue;
        }

        let year = container
            .select(&sel_date)
            .next()
            .and_then(|d| parse_year(&d.text().collect::<String>()));
        let publication_type = container
            .select(&sel_type)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        // the crawled person first, then any co-authors linked on the card
        let mut authors = vec![person.name.clone()];
        let mut author_links = vec![person.url.to_string()];
        for a in container.select(&sel_person) {
            let name = a.text().collect::<String>().trim().to_string();
            if name.is_empty() || name == person.name {
                continue;
            }
            let link = a
                .value()
                .attr("href")
                .and_then(|href| base.join(href).ok())
                .map(|u| u.to_string())
                .unwrap_or_default();
            authors.push(name);
            author_links.push(link);
        }

        records.push(DocumentRecord {
            id: stable_id(&title, &url),
            title,
            authors,
            author_links,
            year,
            url,
            publication_type,
            crawled_at: crawled_at.to_string(),
        });
    }
    records
}

/// First run of four consecutive ASCII digits, e.g. "12 Mar 2021" -> 2021.
fn parse_year(text: &str) -> Option<i32> {
    let bytes = text.as_bytes();
    let mut run = 0usize;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            run += 1;
            if run == 4 {
                let next_is_digit = bytes.get(i + 1).is_some_and(|n| n.is_ascii_digit());
                if !next_is_digit {
                    return text[i + 1 - 4..=i].parse().ok();
                }
            }
        } else {
            run = 0;
        }
    }
    None
}

// --- robots.txt ---------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct RobotsRules {
    allows: Vec<String>,
    disallows: Vec<String>,
    crawl_delay_ms: Option<u64>,
}

type RobotsCache = Arc<RwLock<HashMap<String, RobotsRules>>>;

/// Minimal parser for the '*' user-agent group.
fn parse_robots(txt: &str) -> RobotsRules {
    let mut active = false;
    let mut rules = RobotsRules::default();
    for line in txt.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim();
            match key.trim().to_lowercase().as_str() {
                "user-agent" => active = value == "*",
                "allow" if active => rules.allows.push(value.to_string()),
                "disallow" if active => rules.disallows.push(value.to_string()),
                "crawl-delay" if active => {
                    if let Ok(secs) = value.parse::<f64>() {
                        rules.crawl_delay_ms = Some((secs * 1000.0) as u64);
                    }
                }
                _ => {}
            }
        }
    }
    rules
}

async fn allowed(client: &Client, cache: &RobotsCache, url: &Url, ua: &str) -> Result<bool> {
    let Some(host) = url.host_str().map(str::to_string) else {
        return Ok(false);
    };
    let cached = { cache.read().get(&host).cloned() };
    let rules = match cached {
        Some(rules) => rules,
        None => {
            let robots_url = format!("{}://{}/robots.txt", url.scheme(), host);
            let txt = match client
                .get(&robots_url)
                .header(header::USER_AGENT, ua)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
                _ => String::new(),
            };
            let parsed = parse_robots(&txt);
            cache.write().insert(host, parsed.clone());
            parsed
        }
    };
    Ok(path_allowed(url.path(), &rules))
}

fn robots_delay(cache: &RobotsCache, url: &Url) -> Option<u64> {
    let host = url.host_str()?;
    cache.read().get(host).and_then(|r| r.crawl_delay_ms)
}

/// Rule precedence: longest matching Allow vs Disallow prefix wins.
fn path_allowed(path: &str, rules: &RobotsRules) -> bool {
    let longest = |patterns: &[String]| {
        patterns
            .iter()
            .filter(|p| !p.is_empty() && path.starts_with(p.as_str()))
            .map(|p| p.len())
            .max()
    };
    match (longest(&rules.allows), longest(&rules.disallows)) {
        (Some(a), Some(d)) => a >= d,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => true,
    }
}
