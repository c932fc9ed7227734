//! u8core CLI: load and run a signed module bundle, evaluate a single
//! expression, run the built-in selftest battery, or sign a bundle.
//!
//! The JavaScript engine that would actually execute a loaded module's
//! scripts is a thin external collaborator and out of scope here; `run`
//! and `eval` wire a [`ScriptHost`] so the loader/trust/crypto path is
//! fully exercised up to the point where a real engine would take over.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use u8core::crypto::RsaPrivateKey;
use u8core::loader::{InteractiveTrustPrompter, ModuleLoader};
use u8core::serializer::decode;

/// Load, verify, and run a bundle; evaluate a single expression; run the
/// selftest battery; or sign a module bundle in place.
#[derive(Parser, Debug)]
#[command(name = "exe", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Path to a module bundle to load, verify, and run.
    script_file: Option<PathBuf>,

    /// Evaluate a single expression and print its result.
    #[arg(short = 'e', long = "eval", value_name = "EXPRESSION")]
    eval: Option<String>,

    /// Run the built-in test batteries and exit.
    #[arg(long)]
    selftest: bool,

    /// Sign a zip bundle in place: MODULE_PATH KEY_PATH.
    #[arg(long, num_args = 2, value_names = ["MODULE_PATH", "KEY_PATH"])]
    signmodule: Option<Vec<String>>,
}

/// Collaborator interface a real scripting engine would implement. Only
/// two entries are consumed: evaluate-and-return (used by interactive
/// trust decisions and `--eval`) and run-as-main (used by `run`).
trait ScriptHost {
    fn evaluate(&self, expression: &str) -> anyhow::Result<String>;
    fn run_main(&self, entry_path: &str, source: &[u8], argv: &[String]) -> anyhow::Result<()>;
}

/// A host with no engine wired in. Used by `--selftest`, and as the
/// default for `run`/`eval` until a real engine is linked in.
struct NullScriptHost;

impl ScriptHost for NullScriptHost {
    fn evaluate(&self, expression: &str) -> anyhow::Result<String> {
        anyhow::bail!("no scripting engine wired into this build; cannot evaluate `{expression}`")
    }

    fn run_main(&self, entry_path: &str, _source: &[u8], _argv: &[String]) -> anyhow::Result<()> {
        anyhow::bail!("no scripting engine wired into this build; cannot run `{entry_path}`")
    }
}

fn u8_home() -> PathBuf {
    std::env::var("U8_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".u8")
        })
}

fn main() -> ExitCode {
    panic::install_hook();

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.selftest {
        return selftest::run().await;
    }

    if let Some(args) = cli.signmodule {
        let [module_path, key_path] = <[String; 2]>::try_from(args)
            .map_err(|_| anyhow::anyhow!("--signmodule takes exactly MODULE_PATH KEY_PATH"))?;
        return signmodule(&module_path, &key_path);
    }

    let host = NullScriptHost;

    if let Some(expression) = cli.eval {
        log::info!("evaluating expression");
        let result = host.evaluate(&expression)?;
        println!("{result}");
        return Ok(());
    }

    if let Some(script_file) = cli.script_file {
        let name = script_file
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("script path is not valid UTF-8"))?;

        let u8_publisher_key = RsaPrivateKey::generate(2048)?.public_key();
        let mut loader = ModuleLoader::new(u8_home(), u8_publisher_key, Box::new(InteractiveTrustPrompter));

        log::info!("loading module {name}");
        let module = loader.load(name).await?;
        let entry = module
            .manifest
            .uns_name
            .clone()
            .unwrap_or_else(|| "index.js".to_string());
        let entry_path = module.resolve_required(&entry)?;
        let source = module.read_file(&entry_path)?;

        let argv: Vec<String> = std::env::args().skip(2).collect();
        host.run_main(&entry_path, &source, &argv)?;
        return Ok(());
    }

    anyhow::bail!("usage: exe <script-file> | -e \"<expression>\" | --selftest | --signmodule <module-path> <key-path>")
}

fn signmodule(module_path: &str, key_path: &str) -> anyhow::Result<()> {
    use u8core::loader::Bundle;

    let raw = std::fs::read(module_path)?;
    let zip_body = Bundle::strip_trailer(&raw)?;

    let key_bytes = std::fs::read(key_path)?;
    let key_value = decode(&key_bytes)?;
    let key = RsaPrivateKey::unpack(&key_value)?;

    let signed = Bundle::sign(zip_body, &key)?;
    std::fs::write(module_path, signed)?;

    log::info!("signed {module_path} with key at {key_path}");
    println!("signed {module_path}");
    Ok(())
}

mod panic {
    pub fn install_hook() {
        std::panic::set_hook(Box::new(|panic_info| {
            eprintln!("u8core fatal error:");
            eprintln!("{panic_info}");
            if let Some(location) = panic_info.location() {
                eprintln!("location: {}:{}:{}", location.file(), location.line(), location.column());
            }
        }));
    }
}

mod selftest {
    use u8core::crypto::{HashAlg, RsaPrivateKey};
    use u8core::loader::{Bundle, NonInteractiveTrustPrompter, ModuleLoader};
    use u8core::serializer::{decode, encode, Value};

    /// Exercises a representative slice of every component end to end:
    /// crypto sign/verify, serializer round trip, and a full bundle
    /// build-sign-load-verify cycle. Exits non-zero on the first failure.
    pub async fn run() -> anyhow::Result<()> {
        check_serializer()?;
        println!("ok  serializer round trip");

        check_crypto()?;
        println!("ok  crypto sign/verify round trip");

        check_bundle_load().await?;
        println!("ok  module bundle build/sign/load round trip");

        println!("selftest passed");
        Ok(())
    }

    fn check_serializer() -> anyhow::Result<()> {
        let value = Value::Mapping(vec![
            ("name".to_string(), Value::from("demo")),
            ("count".to_string(), Value::Int(7)),
        ]);
        let bytes = encode(&value);
        let restored = decode(&bytes)?;
        anyhow::ensure!(restored.get("count").and_then(|v| v.as_i64()) == Some(7));
        Ok(())
    }

    fn check_crypto() -> anyhow::Result<()> {
        let key = RsaPrivateKey::generate(2048)?;
        let message = b"u8core selftest";
        let signature = key.sign(message, HashAlg::Sha512)?;
        anyhow::ensure!(key.public_key().verify(message, &signature, HashAlg::Sha512)?);
        Ok(())
    }

    async fn check_bundle_load() -> anyhow::Result<()> {
        let dir = std::env::temp_dir().join(format!("u8core-selftest-{}", std::process::id()));
        std::fs::create_dir_all(&dir)?;
        let result = check_bundle_load_in(&dir).await;
        let _ = std::fs::remove_dir_all(&dir);
        result
    }

    async fn check_bundle_load_in(dir: &std::path::Path) -> anyhow::Result<()> {
        let signer = RsaPrivateKey::generate(2048)?;
        let zip = Bundle::build_zip("name: selftest\n", &[("jslib/index.js".to_string(), b"1".to_vec())])?;
        let signed = Bundle::sign(zip, &signer)?;
        let bundle_path = dir.join("selftest.u8m");
        std::fs::write(&bundle_path, &signed)?;

        let home = dir.join("home");
        let mut store = u8core::loader::TrustStore::default();
        store.grant(&signer.public_key(), None);
        std::fs::create_dir_all(home.join(".u8"))?;
        store.save_to(&home)?;

        let mut loader = ModuleLoader::new(home, RsaPrivateKey::generate(2048)?.public_key(), Box::new(NonInteractiveTrustPrompter));
        let module = loader.load(bundle_path.to_str().unwrap()).await?;
        anyhow::ensure!(module.manifest.name == "selftest");
        anyhow::ensure!(module.resolve_required("index.js").is_ok());
        Ok(())
    }
}
