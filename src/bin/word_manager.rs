use chameleon_server::categories::CategoryProvider;
use clap::{App, Arg, SubCommand};

fn main() {
    let matches = App::new("词表管理器")
        .version("1.0")
        .about("管理变色龙游戏的分类词表")
        .subcommand(SubCommand::with_name("list").about("列出所有分类和词语"))
        .subcommand(
            SubCommand::with_name("add")
                .about("添加词语到分类，分类不存在时自动创建")
                .arg(
                    Arg::with_name("category")
                        .help("分类名称")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("word")
                        .help("要添加的词语")
                        .required(true)
                        .index(2),
                ),
        )
        .subcommand(
            SubCommand::with_name("remove")
                .about("删除整个分类")
                .arg(
                    Arg::with_name("category")
                        .help("分类名称")
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(SubCommand::with_name("stats").about("显示词表统计信息"))
        .subcommand(SubCommand::with_name("validate").about("验证词表完整性"))
        .subcommand(
            SubCommand::with_name("export").about("导出词表到文件").arg(
                Arg::with_name("file")
                    .help("输出文件路径")
                    .required(true)
                    .index(1),
            ),
        )
        .get_matches();

    // 初始化配置
    if let Err(e) = chameleon_server::config::Config::init() {
        eprintln!("配置初始化失败: {}", e);
        return;
    }
    let file_path = chameleon_server::config::Config::get()
        .word_bank
        .file_path
        .clone();

    let mut provider = CategoryProvider::new();

    match matches.subcommand() {
        Some(("list", _)) => {
            println!("分类词表:");
            for category in provider.category_names() {
                let count = provider.category_word_count(category);
                println!("  {}: {} 个词语", category, count);

                if let Some(words) = provider.category_words(category) {
                    for word in words {
                        println!("    {}", word);
                    }
                }
            }
        }
        Some(("add", args)) => {
            let category = args.value_of("category").unwrap();
            let word = args.value_of("word").unwrap();

            provider.add_word(category, word);

            if let Err(e) = provider.save_to_file(&file_path) {
                eprintln!("保存词表失败: {}", e);
            } else {
                println!("成功添加词语: {} -> {}", category, word);
            }
        }
        Some(("remove", args)) => {
            let category = args.value_of("category").unwrap();
            provider.remove_category(category);

            if let Err(e) = provider.save_to_file(&file_path) {
                eprintln!("保存词表失败: {}", e);
            } else {
                println!("成功删除分类: {}", category);
            }
        }
        Some(("stats", _)) => {
            println!("词表统计信息:");
            println!("  总词语数: {}", provider.total_words());
            println!("  总分类数: {}", provider.total_categories());
            for category in provider.category_names() {
                println!(
                    "    {}: {}",
                    category,
                    provider.category_word_count(category)
                );
            }
        }
        Some(("validate", _)) => {
            let errors = provider.validate();
            if errors.is_empty() {
                println!("词表验证通过！");
            } else {
                println!("词表验证发现 {} 个问题:", errors.len());
                for error in errors {
                    println!("  - {}", error);
                }
            }
        }
        Some(("export", args)) => {
            let file_path = args.value_of("file").unwrap();
            if let Err(e) = provider.save_to_file(file_path) {
                eprintln!("导出失败: {}", e);
            } else {
                println!("成功导出词表到: {}", file_path);
            }
        }
        _ => {
            println!("请使用 --help 查看可用命令");
        }
    }
}
