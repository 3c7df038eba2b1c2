use agora_api::{Error as ApiError, SortMode, Uuid};
use anyhow::{anyhow, Context};
use serde_json::json;

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long)]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Start a new thread
    CreateThread {
        #[structopt(short, long)]
        author: String,

        title: String,

        content: String,
    },

    /// Replace the content of a thread
    EditThread { id: Uuid, content: String },

    /// Delete a thread and all its comments
    DeleteThread { id: Uuid },

    /// List threads with their vote counts
    List {
        /// One of default, upvotes or rate
        #[structopt(short, long, default_value = "default")]
        sort: SortMode,
    },

    /// Show a thread with its comment tree
    Show { id: Uuid },

    /// Comment on a thread
    Comment {
        thread: Uuid,

        #[structopt(short, long)]
        author: String,

        content: String,
    },

    /// Reply to a comment
    Reply {
        comment: Uuid,

        #[structopt(short, long)]
        author: String,

        content: String,
    },

    /// Replace the content of a comment
    EditComment { id: Uuid, content: String },

    /// Delete a comment and its replies
    DeleteComment { id: Uuid },

    /// Upvote a thread, or a comment with --comment
    Upvote {
        id: Uuid,

        #[structopt(short, long)]
        user: String,

        #[structopt(long)]
        comment: bool,
    },

    /// Downvote a thread, or a comment with --comment
    Downvote {
        id: Uuid,

        #[structopt(short, long)]
        user: String,

        #[structopt(long)]
        comment: bool,
    },

    /// Threads of a user's friends, up to `depth` hops away
    Feed {
        username: String,

        #[structopt(short, long, default_value = "1")]
        depth: i64,
    },
}

fn collection(comment: bool) -> &'static str {
    match comment {
        true => "comments",
        false => "threads",
    }
}

/// `{host}/api/` followed by `segments`, each percent-encoded as a single path segment
fn api_url(host: &str, segments: &[&str]) -> anyhow::Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(host).with_context(|| format!("parsing host {host:?}"))?;
    url.path_segments_mut()
        .map_err(|()| anyhow!("host {host:?} cannot be a base url"))?
        .pop_if_empty()
        .push("api")
        .extend(segments);
    Ok(url)
}

async fn send(req: reqwest::RequestBuilder) -> anyhow::Result<serde_json::Value> {
    let resp = req.send().await.context("sending request")?;
    let status = resp.status();
    let body = resp.bytes().await.context("reading response body")?;
    if !status.is_success() {
        return Err(match ApiError::parse(&body) {
            Ok(err) => anyhow!(err).context(format!("server answered {status}")),
            Err(_) => anyhow!("server answered {status}: {}", String::from_utf8_lossy(&body)),
        });
    }
    serde_json::from_slice(&body).context("parsing response body")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = <Opt as structopt::StructOpt>::from_args();

    let client = reqwest::Client::new();
    let api = |segments: &[&str]| api_url(&opt.host, segments);

    let res = match opt.cmd {
        Command::CreateThread {
            author,
            title,
            content,
        } => {
            send(client.post(api(&["threads"])?).json(&json!({
                "author": author,
                "title": title,
                "content": content,
            })))
            .await?
        }
        Command::EditThread { id, content } => {
            send(
                client
                    .put(api(&["threads", &id.to_string()])?)
                    .json(&json!({ "content": content })),
            )
            .await?
        }
        Command::DeleteThread { id } => {
            send(client.delete(api(&["threads", &id.to_string()])?)).await?
        }
        Command::List { sort } => {
            let sort = serde_json::to_value(sort).context("serializing sort mode")?;
            let sort = sort.as_str().unwrap_or("default");
            send(client.get(api(&["threads"])?).query(&[("sort", sort)])).await?
        }
        Command::Show { id } => send(client.get(api(&["threads", &id.to_string()])?)).await?,
        Command::Comment {
            thread,
            author,
            content,
        } => {
            send(
                client
                    .post(api(&["threads", &thread.to_string(), "comments"])?)
                    .json(&json!({ "author": author, "content": content })),
            )
            .await?
        }
        Command::Reply {
            comment,
            author,
            content,
        } => {
            send(
                client
                    .post(api(&["comments", &comment.to_string(), "comments"])?)
                    .json(&json!({ "author": author, "content": content })),
            )
            .await?
        }
        Command::EditComment { id, content } => {
            send(
                client
                    .put(api(&["comments", &id.to_string()])?)
                    .json(&json!({ "content": content })),
            )
            .await?
        }
        Command::DeleteComment { id } => {
            send(client.delete(api(&["comments", &id.to_string()])?)).await?
        }
        Command::Upvote { id, user, comment } => {
            send(
                client
                    .post(api(&[collection(comment), &id.to_string(), "upvote"])?)
                    .json(&json!({ "username": user })),
            )
            .await?
        }
        Command::Downvote { id, user, comment } => {
            send(
                client
                    .post(api(&[collection(comment), &id.to_string(), "downvote"])?)
                    .json(&json!({ "username": user })),
            )
            .await?
        }
        Command::Feed { username, depth } => {
            send(
                client
                    .get(api(&["feed", &username])?)
                    .query(&[("depth", depth)]),
            )
            .await?
        }
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&res).context("formatting response")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_stay_one_path_segment() {
        let url = api_url("http://localhost:3000", &["feed", "a/b?depth=9#x"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/api/feed/a%2Fb%3Fdepth=9%23x"
        );
        assert_eq!(url.query(), None);

        let url = api_url("http://localhost:3000/prefix/", &["threads"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/prefix/api/threads");
    }

    #[test]
    fn unusable_hosts_are_reported() {
        assert!(api_url("localhost:3000", &["threads"]).is_err());
        assert!(api_url("not a url", &["threads"]).is_err());
    }
}
